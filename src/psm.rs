//! Position State Machine (C5 static table + C6 engine), §4.2.
//!
//! `optimal_transition` is a total function over `PsmState x SignalClass`:
//! 32 non-neutral table entries plus a self-loop HOLD for NEUTRAL and a
//! forced emergency-liquidation row for `Invalid`.

use crate::portfolio::PsmState;
use crate::threshold::STRONG_MARGIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalClass {
    StrongSell,
    WeakSell,
    Neutral,
    WeakBuy,
    StrongBuy,
}

impl SignalClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalClass::StrongBuy => "STRONG_BUY",
            SignalClass::WeakBuy => "WEAK_BUY",
            SignalClass::Neutral => "NEUTRAL",
            SignalClass::WeakSell => "WEAK_SELL",
            SignalClass::StrongSell => "STRONG_SELL",
        }
    }
}

/// Classifies a probability into a signal class under state-adjusted
/// thresholds with the strong margin (§3 "Signal class").
pub fn classify_signal(probability: f64, t_buy: f64, t_sell: f64) -> SignalClass {
    if probability > t_buy + STRONG_MARGIN {
        SignalClass::StrongBuy
    } else if probability > t_buy {
        SignalClass::WeakBuy
    } else if probability < t_sell - STRONG_MARGIN {
        SignalClass::StrongSell
    } else if probability < t_sell {
        SignalClass::WeakSell
    } else {
        SignalClass::Neutral
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub current_state: PsmState,
    pub signal_class: SignalClass,
    pub target_state: PsmState,
    pub optimal_action: String,
    pub theoretical_basis: String,
    pub expected_return: f64,
    pub risk_score: f64,
    pub confidence: f64,
    pub rejection_reason: Option<String>,
}

struct Row {
    target: PsmState,
    expected_return: f64,
    risk_score: f64,
    confidence: f64,
}

/// The 32 non-neutral table entries from §4.2, indexed by
/// `(current_state, signal_class)`.
fn table_lookup(state: PsmState, class: SignalClass) -> Row {
    use PsmState::*;
    use SignalClass::*;
    let (target, expected_return, risk_score, confidence) = match (state, class) {
        (CashOnly, StrongBuy) => (TqqqOnly, 0.15, 0.80, 0.90),
        (CashOnly, WeakBuy) => (QqqOnly, 0.08, 0.40, 0.70),
        (CashOnly, WeakSell) => (PsqOnly, 0.06, 0.40, 0.60),
        (CashOnly, StrongSell) => (SqqqOnly, 0.12, 0.80, 0.85),

        (QqqOnly, StrongBuy) => (QqqTqqq, 0.18, 0.60, 0.85),
        (QqqOnly, WeakBuy) => (QqqOnly, 0.05, 0.30, 0.60),
        (QqqOnly, WeakSell) => (QqqOnly, 0.02, 0.20, 0.50),
        (QqqOnly, StrongSell) => (CashOnly, 0.00, 0.10, 0.90),

        (TqqqOnly, StrongBuy) => (QqqTqqq, 0.12, 0.50, 0.80),
        (TqqqOnly, WeakBuy) => (TqqqOnly, 0.08, 0.70, 0.60),
        (TqqqOnly, WeakSell) => (QqqOnly, 0.03, 0.30, 0.70),
        (TqqqOnly, StrongSell) => (CashOnly, 0.00, 0.10, 0.95),

        (PsqOnly, StrongBuy) => (CashOnly, 0.00, 0.20, 0.90),
        (PsqOnly, WeakBuy) => (PsqOnly, 0.02, 0.30, 0.60),
        (PsqOnly, WeakSell) => (PsqOnly, 0.04, 0.40, 0.60),
        (PsqOnly, StrongSell) => (PsqSqqq, 0.15, 0.70, 0.80),

        (SqqqOnly, StrongBuy) => (CashOnly, 0.00, 0.10, 0.95),
        (SqqqOnly, WeakBuy) => (PsqOnly, 0.02, 0.40, 0.70),
        (SqqqOnly, WeakSell) => (SqqqOnly, 0.06, 0.80, 0.60),
        (SqqqOnly, StrongSell) => (PsqSqqq, 0.10, 0.60, 0.80),

        (QqqTqqq, StrongBuy) => (QqqTqqq, 0.20, 0.80, 0.90),
        (QqqTqqq, WeakBuy) => (QqqTqqq, 0.06, 0.40, 0.60),
        (QqqTqqq, WeakSell) => (QqqOnly, 0.02, 0.30, 0.70),
        (QqqTqqq, StrongSell) => (CashOnly, 0.00, 0.10, 0.95),

        (PsqSqqq, StrongBuy) => (CashOnly, 0.00, 0.10, 0.95),
        (PsqSqqq, WeakBuy) => (PsqOnly, 0.02, 0.40, 0.70),
        (PsqSqqq, WeakSell) => (PsqSqqq, 0.05, 0.50, 0.60),
        (PsqSqqq, StrongSell) => (PsqSqqq, 0.18, 0.80, 0.85),

        // Invalid and Neutral cells are handled before this table is
        // consulted; unreachable here but kept exhaustive for totality.
        (Invalid, _) => (CashOnly, 0.0, 0.0, 1.0),
        (_, Neutral) => (state, 0.0, 0.0, 0.5),
    };
    Row { target, expected_return, risk_score, confidence }
}

fn action_label(state: PsmState, class: SignalClass, target: PsmState) -> (&'static str, &'static str) {
    if state == target {
        ("Hold", "No favorable transition at current thresholds")
    } else {
        ("Rebalance", action_basis(state, class))
    }
}

fn action_basis(_state: PsmState, class: SignalClass) -> &'static str {
    match class {
        SignalClass::StrongBuy => "Strong bullish signal: increase long/leveraged exposure",
        SignalClass::WeakBuy => "Weak bullish signal: modest long exposure",
        SignalClass::WeakSell => "Weak bearish signal: modest inverse exposure",
        SignalClass::StrongSell => "Strong bearish signal: increase inverse/defensive exposure",
        SignalClass::Neutral => "Signal in neutral zone",
    }
}

fn risk_state_factor(state: PsmState) -> f64 {
    match state {
        PsmState::TqqqOnly | PsmState::SqqqOnly => 1.30,
        PsmState::QqqTqqq | PsmState::PsqSqqq => 1.20,
        PsmState::CashOnly => 0.50,
        _ => 1.0,
    }
}

/// Minimum cash buffer: 10% of a nominal 100,000 unit base (§4.2).
pub const MIN_CASH_BUFFER: f64 = 10_000.0;

/// Computes the optimal transition for `(state, signal_class)`, applying
/// risk adjustment and validation (§4.2). `available_capital` gates the
/// minimum-cash-buffer check.
pub fn optimal_transition(state: PsmState, probability: f64, t_buy: f64, t_sell: f64, available_capital: f64) -> StateTransition {
    if state == PsmState::Invalid {
        return StateTransition {
            current_state: state,
            signal_class: SignalClass::Neutral,
            target_state: PsmState::CashOnly,
            optimal_action: "Emergency liquidation".to_string(),
            theoretical_basis: "Portfolio in an invalid symbol combination; force to cash".to_string(),
            expected_return: 0.0,
            risk_score: 0.0,
            confidence: 1.0,
            rejection_reason: None,
        };
    }

    let class = classify_signal(probability, t_buy, t_sell);
    if class == SignalClass::Neutral {
        return StateTransition {
            current_state: state,
            signal_class: class,
            target_state: state,
            optimal_action: "Hold".to_string(),
            theoretical_basis: "Signal in neutral zone".to_string(),
            expected_return: 0.0,
            risk_score: 0.0,
            confidence: 0.5,
            rejection_reason: None,
        };
    }

    let row = table_lookup(state, class);
    let (action, basis) = action_label(state, class, row.target);
    let risk_score = (row.risk_score * risk_state_factor(state)).clamp(0.0, 1.0);

    let mut transition = StateTransition {
        current_state: state,
        signal_class: class,
        target_state: row.target,
        optimal_action: action.to_string(),
        theoretical_basis: basis.to_string(),
        expected_return: row.expected_return,
        risk_score,
        confidence: row.confidence,
        rejection_reason: None,
    };

    validate(&mut transition, available_capital);
    transition
}

/// Rejects a transition that is too risky, under-confident, or
/// capital-constrained, downgrading it to a self-loop HOLD (§4.2).
fn validate(transition: &mut StateTransition, available_capital: f64) {
    let reason = if transition.risk_score > 0.9 {
        Some("Risk score exceeds maximum threshold")
    } else if transition.confidence < 0.3 {
        Some("Confidence below minimum threshold")
    } else if available_capital < MIN_CASH_BUFFER {
        Some("Available capital below minimum cash buffer")
    } else if transition.current_state == PsmState::Invalid && transition.target_state != PsmState::CashOnly {
        Some("Invalid state must route to CASH_ONLY")
    } else {
        None
    };

    if let Some(reason) = reason {
        transition.target_state = transition.current_state;
        transition.optimal_action = "Hold".to_string();
        transition.rejection_reason = Some(reason.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PsmState::*;

    const ALL_STATES: [PsmState; 8] =
        [CashOnly, QqqOnly, TqqqOnly, PsqOnly, SqqqOnly, QqqTqqq, PsqSqqq, Invalid];

    #[test]
    fn table_is_total_over_state_and_class() {
        let classes = [
            SignalClass::StrongBuy,
            SignalClass::WeakBuy,
            SignalClass::Neutral,
            SignalClass::WeakSell,
            SignalClass::StrongSell,
        ];
        for state in ALL_STATES {
            for class in classes {
                // probability chosen to land in `class` under default thresholds 0.6/0.4
                let probability = match class {
                    SignalClass::StrongBuy => 0.90,
                    SignalClass::WeakBuy => 0.65,
                    SignalClass::Neutral => 0.50,
                    SignalClass::WeakSell => 0.35,
                    SignalClass::StrongSell => 0.10,
                };
                let transition = optimal_transition(state, probability, 0.6, 0.4, 1_000_000.0);
                assert_ne!(transition.target_state, PsmState::Invalid);
            }
        }
    }

    #[test]
    fn invalid_state_forces_emergency_liquidation() {
        let t = optimal_transition(Invalid, 0.5, 0.6, 0.4, 1_000_000.0);
        assert_eq!(t.target_state, CashOnly);
        assert_eq!(t.optimal_action, "Emergency liquidation");
        assert_eq!(t.risk_score, 0.0);
        assert_eq!(t.confidence, 1.0);
    }

    #[test]
    fn neutral_signal_self_loops() {
        let t = optimal_transition(QqqOnly, 0.50, 0.60, 0.40, 1_000_000.0);
        assert_eq!(t.target_state, QqqOnly);
        assert_eq!(t.optimal_action, "Hold");
        assert_eq!(t.theoretical_basis, "Signal in neutral zone");
    }

    #[test]
    fn boundary_probability_is_neutral_not_weak_buy() {
        // p exactly at T_buy must classify as NEUTRAL (strict inequality, §8 boundary case).
        assert_eq!(classify_signal(0.60, 0.60, 0.40), SignalClass::Neutral);
        assert_eq!(classify_signal(0.40, 0.60, 0.40), SignalClass::Neutral);
    }

    #[test]
    fn signal_class_is_monotonic_in_probability() {
        let thresholds = (0.6, 0.4);
        let ps = [0.05, 0.3, 0.5, 0.7, 0.95];
        let classes: Vec<SignalClass> = ps.iter().map(|&p| classify_signal(p, thresholds.0, thresholds.1)).collect();
        for pair in classes.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn rejects_transition_below_minimum_cash_buffer() {
        let t = optimal_transition(CashOnly, 0.95, 0.6, 0.4, 0.0);
        assert_eq!(t.target_state, CashOnly);
        assert!(t.rejection_reason.is_some());
    }

    #[test]
    fn invalid_recovers_to_cash_in_one_bar() {
        let t = optimal_transition(Invalid, 0.1, 0.6, 0.4, 0.0);
        assert_eq!(t.target_state, CashOnly);
    }
}
