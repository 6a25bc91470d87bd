//! `trade` — evaluates the single most recent bar of a CSV against a
//! portfolio snapshot and appends any resulting trade to a JSONL log.

use anyhow::Result;
use clap::Parser;

use equity_psm_engine::config::RunConfig;
use equity_psm_engine::executor::{ExecutionContext, PortfolioExecutor};
use equity_psm_engine::io::read_bar_csv;
use equity_psm_engine::logging;
use equity_psm_engine::portfolio::PortfolioState;
use equity_psm_engine::psm::optimal_transition;
use equity_psm_engine::signals::SignalAggregator;
use equity_psm_engine::threshold;
use equity_psm_engine::trade_log;
use equity_psm_engine::trade_log::Action;

#[derive(Parser, Debug)]
#[command(name = "trade", about = "Evaluate the latest bar and execute one trading decision")]
struct Args {
    /// Path to a CSV file with a `timestamp,open,high,low,close,volume` header.
    #[arg(long)]
    bars: String,

    /// Symbol to tag the bars with if the CSV has no `symbol` column.
    #[arg(long)]
    symbol: String,

    /// Current cash balance.
    #[arg(long)]
    cash: f64,

    /// Path to append executed trades to.
    #[arg(long, default_value = "trades.jsonl")]
    trade_log: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = RunConfig::from_env();
    let series = read_bar_csv(&args.bars, Some(&args.symbol))?;

    let mut aggregator = SignalAggregator::new(config.weights, config.fusion_sharpness, config.warmup_bars);
    let mut last_signal = None;
    for (i, bar) in series.as_slice().iter().enumerate() {
        last_signal = aggregator.on_bar(bar, i, &args.bars);
    }

    let Some(signal) = last_signal else {
        println!("not enough history to form a signal yet");
        return Ok(());
    };
    let last_bar = series.get(series.len() - 1).expect("series is non-empty if a signal was formed");

    let mut portfolio = PortfolioState::new(args.cash, last_bar.timestamp_ms);
    let state = portfolio.classify_state();
    let (t_buy, t_sell) = threshold::adjust(config.base_buy_threshold, config.base_sell_threshold, state);
    let transition = optimal_transition(state, signal.probability, t_buy, t_sell, portfolio.cash_balance);

    let mut prices = std::collections::BTreeMap::new();
    prices.insert(last_bar.symbol.clone(), last_bar.close);

    let run_id = logging::current_run_id();
    let ctx = ExecutionContext {
        run_id: &run_id,
        bar_index: series.len() - 1,
        timestamp_ms: last_bar.timestamp_ms,
        symbol: &last_bar.symbol,
        signal_probability: signal.probability,
        signal_confidence: signal.confidence,
    };

    let executor = PortfolioExecutor::new(config.cost_model());
    let records = executor.execute_transition(&mut portfolio, &transition, &prices, &ctx)?;

    for record in &records {
        trade_log::append(&args.trade_log, record)?;
        match record.action {
            Action::Hold => println!("HOLD {} ({})", record.symbol, record.execution_reason),
            Action::Buy | Action::Sell => println!(
                "{} {} {:.4} @ {:.4} (fee {:.4})",
                record.action.as_str(),
                record.symbol,
                record.quantity,
                record.price,
                record.fees
            ),
        }
    }
    Ok(())
}
