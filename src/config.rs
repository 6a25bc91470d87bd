//! Run configuration (§4.8, §6), loaded from environment variables with
//! defaults, mirroring the teacher's `Config::from_env` pattern.

use crate::cost_model::CostModel;
use crate::signals::Weights;

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Which execution path the orchestrator drives the signal through
/// (Open Question, resolved in favor of keeping both paths live).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Route every signal through the 8-state PSM transition table.
    Psm,
    /// Bypass the state table; act directly on the classified signal.
    Direct,
}

impl ExecutionMode {
    fn from_env() -> Self {
        match std::env::var("EXECUTION_MODE").as_deref() {
            Ok("direct") => ExecutionMode::Direct,
            _ => ExecutionMode::Psm,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub base_buy_threshold: f64,
    pub base_sell_threshold: f64,
    pub weights: Weights,
    pub fusion_sharpness: f64,
    pub warmup_bars: usize,
    pub blocks: usize,
    pub block_size: usize,
    pub nominal_base_equity: f64,
    pub execution_mode: ExecutionMode,
    pub leverage_daily_decay: f64,
    pub leverage_daily_expense: f64,
    pub min_cash_buffer_pct: f64,
    pub scalper_enabled: bool,
    pub scalper_fast_period: usize,
    pub scalper_slow_period: usize,
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self {
            base_buy_threshold: env_f64("PSM_BASE_BUY_THRESHOLD", 0.60),
            base_sell_threshold: env_f64("PSM_BASE_SELL_THRESHOLD", 0.40),
            weights: Weights {
                boll: env_f64("WEIGHT_BOLL", 1.0),
                rsi: env_f64("WEIGHT_RSI", 1.0),
                mom: env_f64("WEIGHT_MOM", 1.0),
                vwap: env_f64("WEIGHT_VWAP", 1.0),
                orb: env_f64("WEIGHT_ORB", 1.0),
                ofi: env_f64("WEIGHT_OFI", 1.0),
                vol: env_f64("WEIGHT_VOL", 1.0),
            },
            fusion_sharpness: env_f64("FUSION_SHARPNESS", 1.0),
            warmup_bars: env_usize("WARMUP_BARS", 30),
            blocks: env_usize("RUN_BLOCKS", 1),
            block_size: env_usize("RUN_BLOCK_SIZE", 480),
            nominal_base_equity: env_f64("NOMINAL_BASE_EQUITY", 100_000.0),
            execution_mode: ExecutionMode::from_env(),
            leverage_daily_decay: env_f64("LEVERAGE_DAILY_DECAY", crate::leverage::DAILY_DECAY),
            leverage_daily_expense: env_f64("LEVERAGE_DAILY_EXPENSE", crate::leverage::DAILY_EXPENSE),
            min_cash_buffer_pct: env_f64("MIN_CASH_BUFFER_PCT", crate::executor::MIN_CASH_BUFFER_PCT),
            scalper_enabled: std::env::var("SCALPER_ENABLED").as_deref() == Ok("1"),
            scalper_fast_period: env_usize("SCALPER_FAST_PERIOD", 5),
            scalper_slow_period: env_usize("SCALPER_SLOW_PERIOD", 20),
            risk_free_rate: env_f64("RISK_FREE_RATE", 0.0),
            periods_per_year: env_f64("PERIODS_PER_YEAR", 252.0),
        }
    }

    pub fn cost_model(&self) -> CostModel {
        match std::env::var("COST_MODEL").as_deref() {
            Ok("fixed") => CostModel::Fixed { per_trade: env_f64("COST_MODEL_FIXED_FEE", 1.0) },
            Ok("percentage") => CostModel::Percentage { rate: env_f64("COST_MODEL_PCT_RATE", 0.001) },
            Ok("alpaca") => CostModel::Alpaca,
            _ => CostModel::Zero,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = RunConfig::from_env();
        assert!(config.base_buy_threshold > config.base_sell_threshold);
        assert_eq!(config.execution_mode, ExecutionMode::Psm);
        assert!(matches!(config.cost_model(), CostModel::Zero));
    }
}
