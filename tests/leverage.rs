//! Determinism and sanity checks for leveraged/inverse data synthesis.

use equity_psm_engine::bar::Bar;
use equity_psm_engine::leverage::{LeverageRegistry, DAILY_DECAY, DAILY_EXPENSE};

fn choppy_base_series() -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut close = 300.0;
    for i in 0..40 {
        let open = close;
        let direction = if i % 3 == 0 { -1.0 } else { 1.0 };
        close = (open * (1.0 + direction * 0.004)).max(1.0);
        let high = open.max(close) + 0.5;
        let low = (open.min(close) - 0.5).max(0.01);
        bars.push(Bar::new(i + 1, "QQQ", open, high, low, close, 2_000.0).unwrap());
    }
    bars
}

#[test]
fn repeated_synthesis_of_the_same_base_series_is_byte_identical() {
    let registry = LeverageRegistry::with_defaults();
    let base = choppy_base_series();

    for symbol in ["TQQQ", "SQQQ", "PSQ"] {
        let first = registry.generate(symbol, &base, DAILY_DECAY, DAILY_EXPENSE);
        let second = registry.generate(symbol, &base, DAILY_DECAY, DAILY_EXPENSE);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.open, b.open);
            assert_eq!(a.close, b.close);
            assert_eq!(a.high, b.high);
            assert_eq!(a.low, b.low);
        }
    }
}

#[test]
fn inverse_series_moves_opposite_the_base_on_average() {
    let registry = LeverageRegistry::with_defaults();
    let base = choppy_base_series();
    let sqqq = registry.generate("SQQQ", &base, DAILY_DECAY, DAILY_EXPENSE);

    let base_total_return = base.last().unwrap().close / base[0].open - 1.0;
    let sqqq_total_return = sqqq.last().unwrap().close / sqqq[0].open - 1.0;
    assert!((base_total_return > 0.0) != (sqqq_total_return > 0.0) || base_total_return.abs() < 1e-9);
}

#[test]
fn every_synthesized_bar_satisfies_ohlc_geometry() {
    let registry = LeverageRegistry::with_defaults();
    let base = choppy_base_series();
    for symbol in ["TQQQ", "SQQQ", "PSQ"] {
        for bar in registry.generate(symbol, &base, DAILY_DECAY, DAILY_EXPENSE) {
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.open.max(bar.close) <= bar.high);
        }
    }
}
