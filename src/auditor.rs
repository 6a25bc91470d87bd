//! Run auditor (C11, §4.7): Sharpe ratio and maximum drawdown over an
//! equity curve, grounded on the teacher's `metrics.rs` equity-peak
//! tracker.

/// Tracks the running equity peak and worst drawdown seen so far.
#[derive(Debug, Clone, Default)]
pub struct DrawdownTracker {
    peak_equity: f64,
    max_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new(starting_equity: f64) -> Self {
        Self { peak_equity: starting_equity, max_drawdown: 0.0 }
    }

    pub fn update(&mut self, equity: f64) {
        self.peak_equity = self.peak_equity.max(equity);
        if self.peak_equity > 0.0 {
            let drawdown = (self.peak_equity - equity) / self.peak_equity;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }
}

/// Annualized Sharpe ratio from per-bar returns, assuming `periods_per_year`
/// bars make up one year (§4.7). Returns `0.0` when fewer than two returns
/// are available or the return series has zero variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let periodic_rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - periodic_rf).collect();
    let mean = excess.iter().sum::<f64>() / excess.len() as f64;
    let variance = excess.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (excess.len() - 1) as f64;
    let std = variance.sqrt();
    if std <= 0.0 {
        return 0.0;
    }
    (mean / std) * periods_per_year.sqrt()
}

/// Converts a cumulative equity curve into per-bar simple returns.
pub fn returns_from_equity_curve(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// End-of-run summary produced from a full equity curve (§4.7, §6).
#[derive(Debug, Clone, Copy)]
pub struct AuditSummary {
    pub final_equity: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub total_return: f64,
}

pub fn summarize(equity_curve: &[f64], risk_free_rate: f64, periods_per_year: f64) -> AuditSummary {
    assert!(!equity_curve.is_empty(), "cannot summarize an empty equity curve");
    let mut tracker = DrawdownTracker::new(equity_curve[0]);
    for &equity in equity_curve {
        tracker.update(equity);
    }
    let returns = returns_from_equity_curve(equity_curve);
    let sharpe = sharpe_ratio(&returns, risk_free_rate, periods_per_year);
    let final_equity = *equity_curve.last().unwrap();
    let total_return = if equity_curve[0] != 0.0 { final_equity / equity_curve[0] - 1.0 } else { 0.0 };

    AuditSummary { final_equity, max_drawdown: tracker.max_drawdown(), sharpe, total_return }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_tracks_worst_peak_to_trough_decline() {
        let mut tracker = DrawdownTracker::new(100.0);
        for equity in [100.0, 120.0, 90.0, 110.0, 60.0] {
            tracker.update(equity);
        }
        assert!((tracker.max_drawdown() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_zero_for_constant_returns_with_no_variance() {
        let returns = vec![0.01, 0.01, 0.01, 0.01];
        assert_eq!(sharpe_ratio(&returns, 0.0, 252.0), 0.0);
    }

    #[test]
    fn sharpe_is_positive_for_consistently_positive_excess_returns() {
        let returns = vec![0.02, 0.01, 0.03, 0.015, 0.025, -0.005];
        let sharpe = sharpe_ratio(&returns, 0.0, 252.0);
        assert!(sharpe > 0.0);
    }

    #[test]
    fn summarize_reports_total_return_and_drawdown_together() {
        let curve = vec![100_000.0, 110_000.0, 95_000.0, 105_000.0];
        let summary = summarize(&curve, 0.0, 252.0);
        assert_eq!(summary.final_equity, 105_000.0);
        assert!((summary.total_return - 0.05).abs() < 1e-9);
        assert!(summary.max_drawdown > 0.0);
    }
}
