//! Portfolio executor (C8, §4.4): turns a PSM transition (or a direct
//! threshold crossing) into trade orders, applies fees, and updates
//! cash/position/equity while preserving the accounting invariants in
//! [`crate::portfolio`]. Every call produces at least one [`TradeRecord`]:
//! an executed trade, or a HOLD carrying the reason nothing happened.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::cost_model::CostModel;
use crate::portfolio::{Position, PortfolioState, PsmState};
use crate::psm::StateTransition;
use crate::trade_log::{Action, TradeRecord};

/// Inverse-leveraged symbols this pipeline recognizes as short exposure,
/// rather than ever selling a symbol short directly (§3, §4.4).
pub const INVERSE_WHITELIST: [&str; 9] =
    ["PSQ", "SH", "SDS", "SPXS", "SQQQ", "QID", "DXD", "SDOW", "DOG"];

/// Fraction of total equity kept uninvested as a cash buffer when
/// allocating into new positions (mirrors [`crate::psm::MIN_CASH_BUFFER`]
/// expressed as a fraction of a 100,000-unit nominal base).
pub const MIN_CASH_BUFFER_PCT: f64 = 0.10;

fn target_symbols(state: PsmState) -> &'static [&'static str] {
    match state {
        PsmState::CashOnly => &[],
        PsmState::QqqOnly => &["QQQ"],
        PsmState::TqqqOnly => &["TQQQ"],
        PsmState::PsqOnly => &["PSQ"],
        PsmState::SqqqOnly => &["SQQQ"],
        PsmState::QqqTqqq => &["QQQ", "TQQQ"],
        PsmState::PsqSqqq => &["PSQ", "SQQQ"],
        PsmState::Invalid => &[],
    }
}

/// Identifies the run/bar a `TradeRecord` belongs to and carries the
/// fused signal's probability/confidence through to the log (§3
/// `TradeRecord`). One context is built per bar in the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub run_id: &'a str,
    pub bar_index: usize,
    pub timestamp_ms: i64,
    pub symbol: &'a str,
    pub signal_probability: f64,
    pub signal_confidence: f64,
}

/// Directional exposure tag the static position manager tracks (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Long,
    Short,
    Neutral,
}

/// Mirrors the original's static position manager: a single LONG / SHORT
/// / NEUTRAL tag plus a per-symbol open-lot counter, used to reject a BUY
/// that would mix long and inverse exposure before it ever touches the
/// portfolio (§4.4). Rebuilt fresh from the portfolio's held symbols each
/// time it is consulted, since the counter and the held quantity can
/// never disagree in this pipeline.
#[derive(Debug, Clone)]
struct StaticPositionManager {
    direction: Direction,
    counters: BTreeMap<String, u32>,
}

impl StaticPositionManager {
    fn from_portfolio(portfolio: &PortfolioState) -> Self {
        let mut counters = BTreeMap::new();
        let mut direction = Direction::Neutral;
        for symbol in portfolio.held_symbols() {
            counters.insert(symbol.to_string(), 1);
            direction = if INVERSE_WHITELIST.contains(&symbol) { Direction::Short } else { Direction::Long };
        }
        Self { direction, counters }
    }

    /// `Err("Conflict detected")` if buying `symbol` would mix long and
    /// inverse exposure; `Ok` otherwise (§4.4).
    fn check_buy(&self, symbol: &str) -> Result<(), &'static str> {
        let inverse = INVERSE_WHITELIST.contains(&symbol);
        match self.direction {
            Direction::Short if !inverse => Err("Conflict detected"),
            Direction::Long if inverse => Err("Conflict detected"),
            _ => Ok(()),
        }
    }
}

pub struct PortfolioExecutor {
    cost_model: CostModel,
}

impl PortfolioExecutor {
    pub fn new(cost_model: CostModel) -> Self {
        Self { cost_model }
    }

    /// Executes a PSM-driven transition (§4.2 -> §4.4 handoff): liquidates
    /// symbols no longer in the target state, then splits the remaining
    /// cash (less the minimum buffer) equally across newly-entered
    /// symbols. Symbols already held that remain in the target state are
    /// left untouched. A rejected or self-loop transition yields a single
    /// HOLD record instead of a panic.
    pub fn execute_transition(
        &self,
        portfolio: &mut PortfolioState,
        transition: &StateTransition,
        prices: &BTreeMap<String, f64>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<TradeRecord>> {
        if transition.target_state == transition.current_state {
            let reason = transition.theoretical_basis.clone();
            return Ok(vec![self.hold(portfolio, ctx, ctx.symbol, &reason, transition.rejection_reason.clone(), true)]);
        }
        let targets: Vec<String> = target_symbols(transition.target_state).iter().map(|s| s.to_string()).collect();
        self.rebalance(portfolio, &targets, prices, ctx)
    }

    /// Bypasses the PSM state table entirely (§4.4 "direct threshold
    /// mode"): BUYs a probability-scaled fraction of available cash when
    /// `probability > t_buy` and `confidence > 0.5` and no position is
    /// held; SELLs the entire held quantity when `probability < t_sell`;
    /// otherwise HOLDs. Never rotates into an inverse symbol — a SELL
    /// liquidates to cash.
    pub fn execute_direct(
        &self,
        portfolio: &mut PortfolioState,
        t_buy: f64,
        t_sell: f64,
        symbol: &str,
        prices: &BTreeMap<String, f64>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<TradeRecord>> {
        let probability = ctx.signal_probability;
        let confidence = ctx.signal_confidence;
        let price = *prices.get(symbol).ok_or_else(|| anyhow::anyhow!("no price quoted for {symbol}"))?;
        let held = portfolio.positions.get(symbol).is_some_and(|p| !p.is_dust());

        if probability > t_buy && confidence > 0.5 && !held {
            let position_size = portfolio.cash_balance * ((probability - 0.5) * 2.0).clamp(0.0, 1.0);
            let quantity = position_size / price;
            let fee = self.cost_model.fee(quantity * price);
            if portfolio.cash_balance < quantity * price + fee {
                return Ok(vec![self.hold(
                    portfolio,
                    ctx,
                    symbol,
                    "Insufficient capital",
                    Some("Insufficient capital".to_string()),
                    true,
                )]);
            }
            let manager = StaticPositionManager::from_portfolio(portfolio);
            if let Err(reason) = manager.check_buy(symbol) {
                return Ok(vec![self.hold(portfolio, ctx, symbol, reason, Some(reason.to_string()), false)]);
            }
            let record = self.buy(
                portfolio,
                symbol,
                price,
                position_size,
                ctx,
                "Strong bullish signal: probability-scaled position size",
            )?;
            return Ok(vec![record]);
        }

        if probability < t_sell && held {
            let record = self.sell_full(portfolio, symbol, price, ctx, "Signal below sell threshold")?;
            return Ok(vec![record]);
        }

        Ok(vec![self.hold(portfolio, ctx, symbol, "Signal in neutral zone", None, true)])
    }

    fn rebalance(
        &self,
        portfolio: &mut PortfolioState,
        targets: &[String],
        prices: &BTreeMap<String, f64>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<TradeRecord>> {
        let held: Vec<String> = portfolio.held_symbols().into_iter().map(|s| s.to_string()).collect();
        let mut records = Vec::new();

        for symbol in held.iter().filter(|s| !targets.contains(s)) {
            let price = *prices
                .get(symbol)
                .ok_or_else(|| anyhow::anyhow!("no price quoted for held symbol {symbol}"))?;
            records.push(self.sell_full(portfolio, symbol, price, ctx, "Rebalancing out of target state")?);
        }

        let buys: Vec<&String> = targets.iter().filter(|s| !held.contains(s)).collect();
        if !buys.is_empty() {
            let reserve = portfolio.total_equity * MIN_CASH_BUFFER_PCT;
            let available = (portfolio.cash_balance - reserve).max(0.0);
            let per_symbol = available / buys.len() as f64;
            for symbol in buys {
                if per_symbol <= 0.0 {
                    continue;
                }
                let manager = StaticPositionManager::from_portfolio(portfolio);
                if let Err(reason) = manager.check_buy(symbol) {
                    records.push(self.hold(portfolio, ctx, symbol, reason, Some(reason.to_string()), false));
                    continue;
                }
                let price = *prices
                    .get(symbol.as_str())
                    .ok_or_else(|| anyhow::anyhow!("no price quoted for target symbol {symbol}"))?;
                records.push(self.buy(portfolio, symbol, price, per_symbol, ctx, "Rebalancing into target state")?);
            }
        }

        portfolio.mark_to_market(prices, ctx.timestamp_ms);
        if records.is_empty() {
            records.push(self.hold(
                portfolio,
                ctx,
                ctx.symbol,
                "No favorable transition at current thresholds",
                None,
                true,
            ));
        }
        Ok(records)
    }

    fn hold(
        &self,
        portfolio: &PortfolioState,
        ctx: &ExecutionContext,
        symbol: &str,
        execution_reason: &str,
        rejection_reason: Option<String>,
        conflict_check_passed: bool,
    ) -> TradeRecord {
        TradeRecord::hold(
            ctx.run_id,
            ctx.timestamp_ms,
            ctx.bar_index,
            symbol,
            portfolio,
            ctx.signal_probability,
            ctx.signal_confidence,
            execution_reason,
            rejection_reason,
            conflict_check_passed,
        )
    }

    fn sell_full(
        &self,
        portfolio: &mut PortfolioState,
        symbol: &str,
        price: f64,
        ctx: &ExecutionContext,
        execution_reason: &str,
    ) -> Result<TradeRecord> {
        let position = portfolio
            .positions
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no position to sell for {symbol}"))?;
        let before_state = portfolio.classify_state();
        let cash_before = portfolio.cash_balance;
        let equity_before = portfolio.total_equity;

        let quantity = position.quantity;
        let trade_value = quantity * price;
        let fee = self.cost_model.fee(trade_value);
        let realized_pnl = (price - position.avg_price) * quantity - fee;

        portfolio.cash_balance += trade_value - fee;
        portfolio.realized_pnl += realized_pnl;
        portfolio.positions.remove(symbol);
        portfolio.total_equity =
            portfolio.cash_balance + portfolio.positions.values().map(|p| p.quantity * p.current_price).sum::<f64>();

        Ok(TradeRecord::new(
            ctx.run_id,
            ctx.timestamp_ms,
            ctx.bar_index,
            symbol,
            Action::Sell,
            quantity,
            price,
            fee,
            cash_before,
            equity_before,
            portfolio,
            ctx.signal_probability,
            ctx.signal_confidence,
            execution_reason,
            None,
            true,
            realized_pnl,
            before_state,
        ))
    }

    fn buy(
        &self,
        portfolio: &mut PortfolioState,
        symbol: &str,
        price: f64,
        budget: f64,
        ctx: &ExecutionContext,
        execution_reason: &str,
    ) -> Result<TradeRecord> {
        anyhow::ensure!(price.is_finite() && price > 0.0, "invalid buy price for {symbol}: {price}");
        let before_state = portfolio.classify_state();
        let cash_before = portfolio.cash_balance;
        let equity_before = portfolio.total_equity;

        let fee = self.cost_model.fee(budget);
        let spendable = (budget - fee).max(0.0);
        let quantity = spendable / price;

        portfolio.cash_balance -= budget;
        portfolio.positions.insert(symbol.to_string(), Position::new(quantity, price));
        portfolio.total_equity =
            portfolio.cash_balance + portfolio.positions.values().map(|p| p.quantity * p.current_price).sum::<f64>();

        Ok(TradeRecord::new(
            ctx.run_id,
            ctx.timestamp_ms,
            ctx.bar_index,
            symbol,
            Action::Buy,
            quantity,
            price,
            fee,
            cash_before,
            equity_before,
            portfolio,
            ctx.signal_probability,
            ctx.signal_confidence,
            execution_reason,
            None,
            true,
            0.0,
            before_state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psm::optimal_transition;

    fn prices(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn ctx<'a>(symbol: &'a str, probability: f64, confidence: f64) -> ExecutionContext<'a> {
        ExecutionContext {
            run_id: "run-test",
            bar_index: 0,
            timestamp_ms: 1,
            symbol,
            signal_probability: probability,
            signal_confidence: confidence,
        }
    }

    #[test]
    fn buying_into_cash_only_opens_a_single_position() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(100_000.0, 0);
        let transition = optimal_transition(PsmState::CashOnly, 0.95, 0.6, 0.4, 100_000.0);
        assert_eq!(transition.target_state, PsmState::TqqqOnly);

        let records = executor
            .execute_transition(&mut portfolio, &transition, &prices(&[("TQQQ", 50.0)]), &ctx("TQQQ", 0.95, 0.9))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "TQQQ");
        assert_eq!(records[0].action, Action::Buy);
        assert!(portfolio.positions.contains_key("TQQQ"));
        assert!(portfolio.cash_balance < 100_000.0);
        assert!(portfolio.equity_identity_holds(1e-6));
    }

    #[test]
    fn self_loop_hold_produces_a_hold_record_not_a_trade() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(100_000.0, 0);
        let transition = optimal_transition(PsmState::CashOnly, 0.5, 0.6, 0.4, 100_000.0);
        assert_eq!(transition.optimal_action, "Hold");

        let records = executor
            .execute_transition(&mut portfolio, &transition, &prices(&[("QQQ", 100.0)]), &ctx("QQQ", 0.5, 0.5))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, Action::Hold);
        assert_eq!(records[0].quantity, 0.0);
    }

    #[test]
    fn rotating_out_of_a_position_realizes_pnl() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(0.0, 0);
        portfolio.positions.insert("TQQQ".to_string(), Position::new(100.0, 50.0));
        portfolio.cash_balance = 0.0;
        portfolio.mark_to_market(&prices(&[("TQQQ", 50.0)]), 0);

        let transition = optimal_transition(PsmState::TqqqOnly, 0.05, 0.6, 0.4, 5_000.0);
        assert_eq!(transition.target_state, PsmState::CashOnly);

        let records = executor
            .execute_transition(&mut portfolio, &transition, &prices(&[("TQQQ", 60.0)]), &ctx("TQQQ", 0.05, 0.9))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, Action::Sell);
        assert_eq!(records[0].realized_pnl_delta, (60.0 - 50.0) * 100.0);
        assert!(!portfolio.positions.contains_key("TQQQ"));
    }

    #[test]
    fn direct_mode_buys_the_probability_scaled_position_size() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(100_000.0, 0);
        let records = executor
            .execute_direct(&mut portfolio, 0.6, 0.4, "QQQ", &prices(&[("QQQ", 100.0)]), &ctx("QQQ", 0.90, 0.8))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "QQQ");
        assert_eq!(records[0].action, Action::Buy);
        assert_eq!(records[0].quantity, 800.0);
        assert_eq!(portfolio.cash_balance, 20_000.0);
    }

    #[test]
    fn direct_mode_holds_when_confidence_is_too_low() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(100_000.0, 0);
        let records = executor
            .execute_direct(&mut portfolio, 0.6, 0.4, "QQQ", &prices(&[("QQQ", 100.0)]), &ctx("QQQ", 0.90, 0.3))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, Action::Hold);
        assert!(portfolio.positions.is_empty());
    }

    #[test]
    fn direct_mode_sells_the_full_position_to_cash_not_into_an_inverse() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(0.0, 0);
        portfolio.positions.insert("QQQ".to_string(), Position::new(100.0, 50.0));
        portfolio.mark_to_market(&prices(&[("QQQ", 55.0)]), 0);

        let records = executor
            .execute_direct(&mut portfolio, 0.6, 0.4, "QQQ", &prices(&[("QQQ", 55.0)]), &ctx("QQQ", 0.10, 0.9))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, Action::Sell);
        assert_eq!(records[0].realized_pnl_delta, 500.0);
        assert_eq!(portfolio.cash_balance, 5_500.0);
        assert!(portfolio.positions.is_empty());
    }

    #[test]
    fn conflict_rejection_downgrades_to_a_hold_record_not_a_panic() {
        let executor = PortfolioExecutor::new(CostModel::Zero);
        let mut portfolio = PortfolioState::new(10_000.0, 0);
        portfolio.positions.insert("PSQ".to_string(), Position::new(50.0, 20.0));
        portfolio.mark_to_market(&prices(&[("PSQ", 20.0)]), 0);

        let records = executor
            .execute_direct(&mut portfolio, 0.6, 0.4, "QQQ", &prices(&[("PSQ", 20.0), ("QQQ", 100.0)]), &ctx("QQQ", 0.8, 0.9))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, Action::Hold);
        assert_eq!(records[0].rejection_reason.as_deref(), Some("Conflict detected"));
        assert!(!records[0].conflict_check_passed);
        assert!(portfolio.positions.contains_key("PSQ"));
        assert!(!portfolio.positions.contains_key("QQQ"));
    }
}
