//! End-to-end executor scenarios: cash deployment, state rotation,
//! emergency liquidation, and accounting invariants holding throughout.

use std::collections::BTreeMap;

use equity_psm_engine::cost_model::CostModel;
use equity_psm_engine::executor::{ExecutionContext, PortfolioExecutor};
use equity_psm_engine::portfolio::{Position, PortfolioState, PsmState};
use equity_psm_engine::psm::optimal_transition;
use equity_psm_engine::trade_log::Action;

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
fn strong_buy_from_cash_deploys_into_triple_leverage() {
    let executor = PortfolioExecutor::new(CostModel::Zero);
    let mut portfolio = PortfolioState::new(100_000.0, 0);

    let transition = optimal_transition(PsmState::CashOnly, 0.92, 0.6, 0.4, portfolio.cash_balance);
    let trades = executor
        .execute_transition(&mut portfolio, &transition, &prices(&[("TQQQ", 50.0)]), &ctx("TQQQ", 0.92, 0.9))
        .unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(portfolio.classify_state(), PsmState::TqqqOnly);
    assert!(portfolio.equity_identity_holds(1e-6));
}

#[test]
fn strong_sell_from_long_rotates_through_cash_into_inverse() {
    let executor = PortfolioExecutor::new(CostModel::Zero);
    let mut portfolio = PortfolioState::new(0.0, 0);
    portfolio.positions.insert("QQQ".to_string(), Position::new(100.0, 400.0));
    portfolio.mark_to_market(&prices(&[("QQQ", 400.0)]), 0);

    let transition = optimal_transition(PsmState::QqqOnly, 0.02, 0.6, 0.4, portfolio.total_equity);
    assert_eq!(transition.target_state, PsmState::CashOnly);

    let trades = executor
        .execute_transition(&mut portfolio, &transition, &prices(&[("QQQ", 410.0)]), &ctx("QQQ", 0.02, 0.9))
        .unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(portfolio.classify_state(), PsmState::CashOnly);
    assert!(portfolio.equity_identity_holds(1e-6));
}

#[test]
fn invalid_state_force_liquidates_every_held_symbol() {
    let executor = PortfolioExecutor::new(CostModel::Zero);
    let mut portfolio = PortfolioState::new(0.0, 0);
    portfolio.positions.insert("QQQ".to_string(), Position::new(10.0, 400.0));
    portfolio.positions.insert("SQQQ".to_string(), Position::new(20.0, 15.0));
    portfolio.mark_to_market(&prices(&[("QQQ", 400.0), ("SQQQ", 15.0)]), 0);
    assert_eq!(portfolio.classify_state(), PsmState::Invalid);

    let transition = optimal_transition(PsmState::Invalid, 0.5, 0.6, 0.4, portfolio.total_equity);
    assert_eq!(transition.optimal_action, "Emergency liquidation");

    let trades = executor
        .execute_transition(&mut portfolio, &transition, &prices(&[("QQQ", 400.0), ("SQQQ", 15.0)]), &ctx("QQQ", 0.5, 1.0))
        .unwrap();

    assert_eq!(trades.len(), 2);
    assert_eq!(portfolio.classify_state(), PsmState::CashOnly);
    assert!(portfolio.equity_identity_holds(1e-6));
}

#[test]
fn pyramiding_into_the_long_pair_keeps_the_existing_position_untouched() {
    let executor = PortfolioExecutor::new(CostModel::Zero);
    let mut portfolio = PortfolioState::new(50_000.0, 0);
    portfolio.positions.insert("QQQ".to_string(), Position::new(100.0, 400.0));
    portfolio.mark_to_market(&prices(&[("QQQ", 400.0)]), 0);

    let transition = optimal_transition(PsmState::QqqOnly, 0.92, 0.6, 0.4, portfolio.cash_balance);
    assert_eq!(transition.target_state, PsmState::QqqTqqq);

    let trades = executor
        .execute_transition(
            &mut portfolio,
            &transition,
            &prices(&[("QQQ", 400.0), ("TQQQ", 50.0)]),
            &ctx("QQQ", 0.92, 0.9),
        )
        .unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].symbol, "TQQQ");
    assert_eq!(portfolio.positions.get("QQQ").unwrap().quantity, 100.0);
    assert!(portfolio.group_exclusivity_holds());
}

#[test]
fn percentage_fees_reduce_realized_pnl_on_exit() {
    let executor = PortfolioExecutor::new(CostModel::Percentage { rate: 0.001 });
    let mut portfolio = PortfolioState::new(0.0, 0);
    portfolio.positions.insert("TQQQ".to_string(), Position::new(100.0, 50.0));
    portfolio.mark_to_market(&prices(&[("TQQQ", 50.0)]), 0);

    let transition = optimal_transition(PsmState::TqqqOnly, 0.02, 0.6, 0.4, portfolio.total_equity);
    let trades = executor
        .execute_transition(&mut portfolio, &transition, &prices(&[("TQQQ", 60.0)]), &ctx("TQQQ", 0.02, 0.9))
        .unwrap();

    let gross = (60.0 - 50.0) * 100.0;
    assert!(trades[0].realized_pnl_delta < gross);
    assert_eq!(trades[0].fees, 60.0 * 100.0 * 0.001);
}

#[test]
fn neutral_signal_self_loops_into_a_hold_record_with_no_portfolio_mutation() {
    let executor = PortfolioExecutor::new(CostModel::Zero);
    let mut portfolio = PortfolioState::new(100_000.0, 0);
    let transition = optimal_transition(PsmState::CashOnly, 0.5, 0.6, 0.4, portfolio.cash_balance);
    let trades = executor
        .execute_transition(&mut portfolio, &transition, &prices(&[("QQQ", 400.0)]), &ctx("QQQ", 0.5, 0.5))
        .unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, Action::Hold);
    assert_eq!(portfolio.cash_balance, 100_000.0);
}
