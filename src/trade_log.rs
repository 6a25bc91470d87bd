//! Append-only trade log (C9): one JSONL record per executed or HOLD
//! decision (§6).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::portfolio::{PortfolioState, PsmState};

/// Side of a pending, not-yet-evaluated order (§3 `TradeOrder`). A HOLD is
/// never issued as an order — only ever recorded as a [`TradeRecord`]
/// outcome, hence the narrower enum here than [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A single trade order issued by the executor (data model §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOrder {
    pub timestamp_ms: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub reference_price: f64,
}

/// The outcome of one bar's executor evaluation — an executed trade or a
/// HOLD, always with reasoning and a portfolio snapshot attached (§3
/// "TradeOrder / TradeRecord").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

/// A fully populated trade-log record: one per executed or HOLD decision
/// (§6 "Trade log format"). `rejection_reason` is set only for a business
/// rejection (insufficient capital, conflict, risk/confidence
/// validation); `execution_reason` is always set, describing why the
/// action — whatever it was — was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub run_id: String,
    pub timestamp_ms: i64,
    pub bar_index: usize,
    pub symbol: String,
    pub action: Action,
    pub quantity: f64,
    pub price: f64,
    pub trade_value: f64,
    pub fees: f64,
    pub cash_before: f64,
    pub equity_before: f64,
    pub cash_after: f64,
    pub equity_after: f64,
    pub positions_after: usize,
    pub signal_probability: f64,
    pub signal_confidence: f64,
    pub execution_reason: String,
    pub rejection_reason: Option<String>,
    pub conflict_check_passed: bool,
    pub realized_pnl_delta: f64,
    pub unrealized_after: f64,
    pub positions_summary: String,
    pub before_state: String,
    pub after_state: String,
}

impl TradeRecord {
    /// Builds a record from `portfolio`'s state *after* the mutation (or,
    /// for a HOLD, its unchanged current state). `before_state` is the PSM
    /// classification the caller captured prior to any mutation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        timestamp_ms: i64,
        bar_index: usize,
        symbol: impl Into<String>,
        action: Action,
        quantity: f64,
        price: f64,
        fees: f64,
        cash_before: f64,
        equity_before: f64,
        portfolio_after: &PortfolioState,
        signal_probability: f64,
        signal_confidence: f64,
        execution_reason: impl Into<String>,
        rejection_reason: Option<String>,
        conflict_check_passed: bool,
        realized_pnl_delta: f64,
        before_state: PsmState,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp_ms,
            bar_index,
            symbol: symbol.into(),
            action,
            quantity,
            price,
            trade_value: quantity * price,
            fees,
            cash_before,
            equity_before,
            cash_after: portfolio_after.cash_balance,
            equity_after: portfolio_after.total_equity,
            positions_after: portfolio_after.held_symbols().len(),
            signal_probability,
            signal_confidence,
            execution_reason: execution_reason.into(),
            rejection_reason,
            conflict_check_passed,
            realized_pnl_delta,
            unrealized_after: portfolio_after.unrealized_pnl,
            positions_summary: portfolio_after.positions_summary(),
            before_state: before_state.as_str().to_string(),
            after_state: portfolio_after.classify_state().as_str().to_string(),
        }
    }

    /// Builds a HOLD record against `portfolio`'s current (unmutated)
    /// state. The neutral-zone, conflict-rejection, insufficient-capital,
    /// and scalper-veto cases all funnel through here (§8 scenarios 3, 5).
    #[allow(clippy::too_many_arguments)]
    pub fn hold(
        run_id: impl Into<String>,
        timestamp_ms: i64,
        bar_index: usize,
        symbol: impl Into<String>,
        portfolio: &PortfolioState,
        signal_probability: f64,
        signal_confidence: f64,
        execution_reason: impl Into<String>,
        rejection_reason: Option<String>,
        conflict_check_passed: bool,
    ) -> Self {
        let state = portfolio.classify_state();
        Self::new(
            run_id,
            timestamp_ms,
            bar_index,
            symbol,
            Action::Hold,
            0.0,
            0.0,
            0.0,
            portfolio.cash_balance,
            portfolio.total_equity,
            portfolio,
            signal_probability,
            signal_confidence,
            execution_reason,
            rejection_reason,
            conflict_check_passed,
            0.0,
            state,
        )
    }
}

/// Appends `record` as one JSON line to `path`, creating the file and any
/// parent directories if needed.
pub fn append(path: impl AsRef<Path>, record: &TradeRecord) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating trade log directory {}", parent.display()))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening trade log {}", path.display()))?;
    let line = serde_json::to_string(record).context("serializing trade record")?;
    writeln!(file, "{line}").with_context(|| format!("writing trade log {}", path.display()))?;
    Ok(())
}

/// Reads every record from a JSONL trade log, in file order.
pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening trade log {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading trade log line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TradeRecord = serde_json::from_str(&line).context("parsing trade log line")?;
        records.push(record);
    }
    Ok(records)
}
