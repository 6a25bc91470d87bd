//! Sharpe ratio and max drawdown against hand-computed equity curves.

use equity_psm_engine::auditor::{sharpe_ratio, summarize};

#[test]
fn flat_equity_curve_has_zero_drawdown_and_zero_sharpe() {
    let curve = vec![100_000.0; 10];
    let summary = summarize(&curve, 0.0, 252.0);
    assert_eq!(summary.max_drawdown, 0.0);
    assert_eq!(summary.sharpe, 0.0);
    assert_eq!(summary.total_return, 0.0);
}

#[test]
fn known_peak_to_trough_decline_matches_hand_computed_drawdown() {
    let curve = vec![100_000.0, 120_000.0, 84_000.0, 90_000.0];
    let summary = summarize(&curve, 0.0, 252.0);
    // peak 120,000 -> trough 84,000 is a 30% decline.
    assert!((summary.max_drawdown - 0.30).abs() < 1e-9);
}

#[test]
fn single_return_is_not_enough_to_compute_a_sharpe_ratio() {
    assert_eq!(sharpe_ratio(&[0.05], 0.0, 252.0), 0.0);
    assert_eq!(sharpe_ratio(&[], 0.0, 252.0), 0.0);
}

#[test]
fn higher_risk_free_rate_lowers_the_sharpe_ratio() {
    let returns = vec![0.01, 0.012, 0.009, 0.011, 0.0105];
    let low_rf = sharpe_ratio(&returns, 0.0, 252.0);
    let high_rf = sharpe_ratio(&returns, 0.5, 252.0);
    assert!(high_rf < low_rf);
}

#[test]
#[should_panic(expected = "empty equity curve")]
fn summarize_rejects_an_empty_curve() {
    summarize(&[], 0.0, 252.0);
}
