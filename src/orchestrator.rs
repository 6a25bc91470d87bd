//! Run orchestrator (C10, §4.8): wires bars through the indicator cache,
//! signal aggregator, adaptive thresholds, (optional) scalper veto, PSM
//! or direct execution, and the trade/audit logs — grounded on the
//! teacher's `run_backtest` loop structure in `backtest.rs`.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::auditor::{summarize, AuditSummary};
use crate::bar::BarSeries;
use crate::config::{ExecutionMode, RunConfig};
use crate::executor::{ExecutionContext, PortfolioExecutor};
use crate::logging::{self, log_hold, log_run_summary, log_trade, log_transition};
use crate::portfolio::PortfolioState;
use crate::psm::{classify_signal, optimal_transition};
use crate::scalper::ScalperOverlay;
use crate::signals::SignalAggregator;
use crate::threshold;
use crate::trade_log::{Action, TradeRecord};

/// Everything produced by one `run_window` call, for reporting or
/// further auditing by the caller.
pub struct RunResult {
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub summary: AuditSummary,
}

/// Runs the pipeline over the trailing `config.blocks * config.block_size`
/// bars of `series` against `starting_cash`, returning every trade and the
/// resulting equity curve.
pub fn run_window(series: &BarSeries, config: &RunConfig, starting_cash: f64, market_data_path: &str) -> Result<RunResult> {
    let (start, end) = series.window_for_blocks(config.blocks, config.block_size);
    let bars = &series.as_slice()[start..end];
    let run_id = logging::current_run_id();

    let mut aggregator = SignalAggregator::new(config.weights, config.fusion_sharpness, config.warmup_bars);
    let mut portfolio = PortfolioState::new(starting_cash, bars.first().map(|b| b.timestamp_ms).unwrap_or(0));
    let executor = PortfolioExecutor::new(config.cost_model());
    let mut scalper = config
        .scalper_enabled
        .then(|| ScalperOverlay::new(config.scalper_fast_period, config.scalper_slow_period));

    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let mut prices = BTreeMap::new();
        prices.insert(bar.symbol.clone(), bar.close);

        let signal = match aggregator.on_bar(bar, start + i, market_data_path) {
            Some(signal) => signal,
            None => {
                portfolio.mark_to_market(&prices, bar.timestamp_ms);
                equity_curve.push(portfolio.total_equity);
                continue;
            }
        };

        let state = portfolio.classify_state();
        let (t_buy, t_sell) = threshold::adjust(config.base_buy_threshold, config.base_sell_threshold, state);

        let ctx = ExecutionContext {
            run_id: &run_id,
            bar_index: start + i,
            timestamp_ms: bar.timestamp_ms,
            symbol: &bar.symbol,
            signal_probability: signal.probability,
            signal_confidence: signal.confidence,
        };

        let mut veto = false;
        if let Some(overlay) = scalper.as_mut() {
            let regime = overlay.update(bar.close);
            let class = classify_signal(signal.probability, t_buy, t_sell);
            veto = overlay.vetoes(regime, class);
        }

        let produced = if veto {
            vec![TradeRecord::hold(
                ctx.run_id,
                ctx.timestamp_ms,
                ctx.bar_index,
                ctx.symbol,
                &portfolio,
                ctx.signal_probability,
                ctx.signal_confidence,
                "Scalper regime veto",
                Some("Scalper regime veto".to_string()),
                true,
            )]
        } else {
            match config.execution_mode {
                ExecutionMode::Psm => {
                    let transition = optimal_transition(state, signal.probability, t_buy, t_sell, portfolio.cash_balance);
                    log_transition(
                        &bar.symbol,
                        state.as_str(),
                        transition.signal_class.as_str(),
                        transition.target_state.as_str(),
                        &transition.optimal_action,
                    );
                    executor.execute_transition(&mut portfolio, &transition, &prices, &ctx)?
                }
                ExecutionMode::Direct => {
                    executor.execute_direct(&mut portfolio, t_buy, t_sell, &bar.symbol, &prices, &ctx)?
                }
            }
        };

        for trade in &produced {
            match trade.action {
                Action::Hold => log_hold(&trade.symbol, &trade.execution_reason, trade.rejection_reason.as_deref()),
                Action::Buy | Action::Sell => {
                    log_trade(&trade.symbol, trade.action.as_str(), trade.quantity, trade.price, trade.fees, trade.realized_pnl_delta)
                }
            }
        }
        trades.extend(produced);

        portfolio.mark_to_market(&prices, bar.timestamp_ms);
        equity_curve.push(portfolio.total_equity);
    }

    let summary = summarize(&equity_curve, config.risk_free_rate, config.periods_per_year);
    log_run_summary(trades.len() as u64, summary.sharpe, summary.max_drawdown, summary.final_equity);

    Ok(RunResult { trades, equity_curve, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    fn synthetic_series(symbol: &str, n: usize) -> BarSeries {
        let mut series = BarSeries::new(symbol);
        let mut close = 100.0;
        for i in 0..n {
            let open = close;
            close *= 1.0 + 0.001 * ((i % 7) as f64 - 3.0);
            let high = open.max(close) + 0.2;
            let low = open.min(close) - 0.2;
            series.push(Bar::new(i as i64 + 1, symbol, open, high, low, close, 1_000.0).unwrap()).unwrap();
        }
        series
    }

    #[test]
    fn run_window_produces_an_equity_curve_covering_every_bar() {
        let series = synthetic_series("QQQ", 60);
        let mut config = RunConfig::from_env();
        config.warmup_bars = 25;
        config.blocks = 1;
        config.block_size = 60;

        let result = run_window(&series, &config, 100_000.0, "synthetic.csv").unwrap();
        assert_eq!(result.equity_curve.len(), 60);
    }

    #[test]
    fn run_window_respects_the_block_window() {
        let series = synthetic_series("QQQ", 200);
        let mut config = RunConfig::from_env();
        config.warmup_bars = 10;
        config.blocks = 1;
        config.block_size = 50;

        let result = run_window(&series, &config, 100_000.0, "synthetic.csv").unwrap();
        assert_eq!(result.equity_curve.len(), 50);
    }
}
