//! Portfolio data model (§3): positions, cash, equity, and the PSM state
//! classification derived from which symbols are held.

use std::collections::BTreeMap;

/// A position is always non-negative; short exposure is expressed by
/// holding an inverse instrument, never by negative quantity (§3).
pub const DUST_THRESHOLD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn new(quantity: f64, avg_price: f64) -> Self {
        Self { quantity, avg_price, current_price: avg_price, unrealized_pnl: 0.0, realized_pnl: 0.0 }
    }

    pub fn mark_to_market(&mut self, price: f64) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.avg_price) * self.quantity;
    }

    pub fn is_dust(&self) -> bool {
        self.quantity.abs() < DUST_THRESHOLD
    }
}

/// The eight portfolio states, exhaustive partition of valid portfolios
/// (§3). `Invalid` covers any symbol set that is not one of the other
/// seven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsmState {
    CashOnly,
    QqqOnly,
    TqqqOnly,
    PsqOnly,
    SqqqOnly,
    QqqTqqq,
    PsqSqqq,
    Invalid,
}

impl PsmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PsmState::CashOnly => "CASH_ONLY",
            PsmState::QqqOnly => "QQQ_ONLY",
            PsmState::TqqqOnly => "TQQQ_ONLY",
            PsmState::PsqOnly => "PSQ_ONLY",
            PsmState::SqqqOnly => "SQQQ_ONLY",
            PsmState::QqqTqqq => "QQQ_TQQQ",
            PsmState::PsqSqqq => "PSQ_SQQQ",
            PsmState::Invalid => "INVALID",
        }
    }
}

/// `{cash_balance, positions, total_equity, unrealized_pnl, realized_pnl,
/// timestamp_ms}` from the data model (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    pub cash_balance: f64,
    pub positions: BTreeMap<String, Position>,
    pub total_equity: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub timestamp_ms: i64,
}

impl PortfolioState {
    pub fn new(cash_balance: f64, timestamp_ms: i64) -> Self {
        Self {
            cash_balance,
            positions: BTreeMap::new(),
            total_equity: cash_balance,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            timestamp_ms,
        }
    }

    /// Non-dust symbols held, used for state classification and conflict
    /// checks.
    pub fn held_symbols(&self) -> Vec<&str> {
        self.positions
            .iter()
            .filter(|(_, p)| !p.is_dust())
            .map(|(sym, _)| sym.as_str())
            .collect()
    }

    /// Marks every held position to `prices[symbol]` (falls back to the
    /// existing `current_price` if a symbol has no quote this bar) and
    /// recomputes equity and aggregate P&L (§4.4 "Mark-to-market").
    pub fn mark_to_market(&mut self, prices: &BTreeMap<String, f64>, timestamp_ms: i64) {
        self.timestamp_ms = timestamp_ms;
        let mut unrealized = 0.0;
        let mut realized = 0.0;
        let mut notional = 0.0;
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(&price) = prices.get(symbol) {
                position.mark_to_market(price);
            }
            unrealized += position.unrealized_pnl;
            realized += position.realized_pnl;
            notional += position.quantity * position.current_price;
        }
        self.unrealized_pnl = unrealized;
        self.realized_pnl = realized;
        self.total_equity = self.cash_balance + notional;
    }

    /// Classifies the held symbol set into a [`PsmState`] (§4.2).
    pub fn classify_state(&self) -> PsmState {
        let mut held = self.held_symbols();
        held.sort_unstable();
        match held.as_slice() {
            [] => PsmState::CashOnly,
            ["QQQ"] => PsmState::QqqOnly,
            ["TQQQ"] => PsmState::TqqqOnly,
            ["PSQ"] => PsmState::PsqOnly,
            ["SQQQ"] => PsmState::SqqqOnly,
            ["QQQ", "TQQQ"] => PsmState::QqqTqqq,
            ["PSQ", "SQQQ"] => PsmState::PsqSqqq,
            _ => PsmState::Invalid,
        }
    }

    /// `total_equity == cash + sum(qty * current_price)` within tolerance
    /// (testable property §8.3).
    pub fn equity_identity_holds(&self, tol: f64) -> bool {
        let notional: f64 = self.positions.values().map(|p| p.quantity * p.current_price).sum();
        (self.total_equity - (self.cash_balance + notional)).abs() <= tol * self.total_equity.abs().max(1.0)
    }

    /// At most one of the long group `{QQQ, TQQQ}` and one of the inverse
    /// group `{PSQ, SQQQ}` may be present simultaneously (§3).
    pub fn group_exclusivity_holds(&self) -> bool {
        let held = self.held_symbols();
        let long = held.iter().any(|s| *s == "QQQ") || held.iter().any(|s| *s == "TQQQ");
        let inverse = held.iter().any(|s| *s == "PSQ") || held.iter().any(|s| *s == "SQQQ");
        !(long && inverse)
    }

    /// `"SYM:qty,SYM:qty,..."` over non-dust holdings, in symbol order
    /// (§6 trade-log `positions_summary` field).
    pub fn positions_summary(&self) -> String {
        self.positions
            .iter()
            .filter(|(_, p)| !p.is_dust())
            .map(|(symbol, p)| format!("{symbol}:{}", p.quantity))
            .collect::<Vec<_>>()
            .join(",")
    }
}
