//! `audit` — summarizes a trade log into Sharpe ratio and max drawdown
//! figures.

use anyhow::Result;
use clap::Parser;

use equity_psm_engine::auditor::summarize;
use equity_psm_engine::trade_log;

#[derive(Parser, Debug)]
#[command(name = "audit", about = "Summarize a JSONL trade log")]
struct Args {
    /// Path to a JSONL trade log produced by `trade` or `strattest`.
    #[arg(long)]
    trade_log: String,

    /// Annual risk-free rate used in the Sharpe calculation.
    #[arg(long, default_value_t = 0.0)]
    risk_free_rate: f64,

    /// Number of bars per year, for annualizing the Sharpe ratio.
    #[arg(long, default_value_t = 252.0)]
    periods_per_year: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let records = trade_log::read_all(&args.trade_log)?;
    anyhow::ensure!(!records.is_empty(), "trade log {} has no records to audit", args.trade_log);

    let equity_curve: Vec<f64> = records.iter().map(|r| r.equity_after).collect();
    let summary = summarize(&equity_curve, args.risk_free_rate, args.periods_per_year);

    println!("trades        : {}", records.len());
    println!("final equity  : {:.2}", summary.final_equity);
    println!("total return  : {:.4}", summary.total_return);
    println!("max drawdown  : {:.4}", summary.max_drawdown);
    println!("sharpe        : {:.4}", summary.sharpe);
    Ok(())
}
