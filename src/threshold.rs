//! Adaptive threshold transform (C7, §4.3).

use crate::portfolio::PsmState;

/// Strong-margin used to separate WEAK_* from STRONG_* signal classes.
pub const STRONG_MARGIN: f64 = 0.15;

fn state_factors(state: PsmState) -> (f64, f64) {
    match state {
        PsmState::QqqTqqq | PsmState::PsqSqqq => (0.95, 1.05),
        PsmState::TqqqOnly | PsmState::SqqqOnly => (0.90, 1.10),
        PsmState::CashOnly => (1.05, 0.95),
        PsmState::QqqOnly | PsmState::PsqOnly => (1.00, 1.00),
        PsmState::Invalid => (0.80, 1.20),
    }
}

/// Adjusts `(base_buy, base_sell)` for the current state, then enforces a
/// minimum gap and clamps to the valid ranges (§4.3, property §8.1).
///
/// Always called with the run's fixed base thresholds, never with a prior
/// call's own output: the state multipliers compound under repeated
/// self-application (e.g. `CashOnly` turns `(0.6, 0.4)` into `(0.63, 0.38)`
/// and then into `(0.6615, 0.361)`), so `adjust` is not a fixed point of
/// itself and must not be chained across bars.
pub fn adjust(base_buy: f64, base_sell: f64, state: PsmState) -> (f64, f64) {
    let (buy_mult, sell_mult) = state_factors(state);
    let mut t_buy = base_buy * buy_mult;
    let mut t_sell = base_sell * sell_mult;

    if t_buy - t_sell < 0.05 {
        let mid = (t_buy + t_sell) / 2.0;
        t_buy = mid + 0.025;
        t_sell = mid - 0.025;
    }

    t_buy = t_buy.clamp(0.51, 0.90);
    t_sell = t_sell.clamp(0.10, 0.49);
    (t_buy, t_sell)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_minimum_gap() {
        let (buy, sell) = adjust(0.52, 0.50, PsmState::CashOnly);
        assert!(buy - sell >= 0.05 - 1e-9);
    }

    #[test]
    fn clamps_to_valid_ranges() {
        for state in [
            PsmState::CashOnly,
            PsmState::QqqOnly,
            PsmState::TqqqOnly,
            PsmState::PsqOnly,
            PsmState::SqqqOnly,
            PsmState::QqqTqqq,
            PsmState::PsqSqqq,
            PsmState::Invalid,
        ] {
            let (buy, sell) = adjust(0.6, 0.4, state);
            assert!((0.51..=0.90).contains(&buy), "buy out of range for {state:?}");
            assert!((0.10..=0.49).contains(&sell), "sell out of range for {state:?}");
            assert!(buy - sell >= 0.05 - 1e-9);
        }
    }

    #[test]
    fn same_base_inputs_always_produce_the_same_thresholds() {
        let first = adjust(0.6, 0.4, PsmState::TqqqOnly);
        let second = adjust(0.6, 0.4, PsmState::TqqqOnly);
        assert_eq!(first, second);
    }

    #[test]
    fn feeding_output_back_in_as_new_input_is_not_a_fixed_point() {
        let (buy, sell) = adjust(0.6, 0.4, PsmState::CashOnly);
        assert!((buy - 0.63).abs() < 1e-9);
        assert!((sell - 0.38).abs() < 1e-9);

        let (buy2, sell2) = adjust(buy, sell, PsmState::CashOnly);
        assert_ne!((buy, sell), (buy2, sell2));
    }
}
