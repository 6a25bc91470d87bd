//! `strattest` — runs the signal/PSM/executor pipeline over a historical
//! bar CSV and prints a run summary.

use anyhow::Result;
use clap::Parser;

use equity_psm_engine::config::RunConfig;
use equity_psm_engine::io::read_bar_csv;
use equity_psm_engine::orchestrator::run_window;

#[derive(Parser, Debug)]
#[command(name = "strattest", about = "Backtest the PSM pipeline over a bar CSV")]
struct Args {
    /// Path to a CSV file with a `timestamp,open,high,low,close,volume` header.
    #[arg(long)]
    bars: String,

    /// Symbol to tag the bars with if the CSV has no `symbol` column.
    #[arg(long)]
    symbol: String,

    /// Starting cash balance.
    #[arg(long, default_value_t = 100_000.0)]
    starting_cash: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = RunConfig::from_env();
    let series = read_bar_csv(&args.bars, Some(&args.symbol))?;
    let result = run_window(&series, &config, args.starting_cash, &args.bars)?;

    println!("bars processed : {}", result.equity_curve.len());
    println!("trades executed: {}", result.trades.len());
    println!("final equity   : {:.2}", result.summary.final_equity);
    println!("total return   : {:.4}", result.summary.total_return);
    println!("max drawdown   : {:.4}", result.summary.max_drawdown);
    println!("sharpe         : {:.4}", result.summary.sharpe);
    Ok(())
}
