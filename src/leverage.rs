//! Leveraged/inverse instrument data synthesis (C2, §4.5).
//!
//! Grounded on `original_source/src/backend/leverage_data_generator.cpp`:
//! synthetic series are built by compounding the base instrument's daily
//! returns through a fixed multiplier, with a small constant daily decay
//! and expense drag, and a starting price of 100.0 for long leverage and
//! 50.0 for inverse instruments.

use std::collections::HashMap;

use crate::bar::Bar;

/// Default daily leverage decay from rebalancing cost, passed to
/// [`LeverageRegistry::generate`] when the caller has no override (§4.5).
pub const DAILY_DECAY: f64 = 0.0001;
/// Default daily expense-ratio drag, passed to [`LeverageRegistry::generate`]
/// when the caller has no override (§4.5).
pub const DAILY_EXPENSE: f64 = 0.00003;

const STARTING_PRICE_LONG: f64 = 100.0;
const STARTING_PRICE_INVERSE: f64 = 50.0;

#[derive(Debug, Clone, Copy)]
pub struct LeverageSpec {
    pub multiplier: f64,
}

impl LeverageSpec {
    pub fn is_inverse(&self) -> bool {
        self.multiplier < 0.0
    }

    fn starting_price(&self) -> f64 {
        if self.is_inverse() { STARTING_PRICE_INVERSE } else { STARTING_PRICE_LONG }
    }
}

/// The fixed family of leveraged/inverse symbols this pipeline knows how
/// to synthesize, each tied to a base (unleveraged) symbol (§4.5).
#[derive(Debug, Clone)]
pub struct LeverageRegistry {
    specs: HashMap<String, (String, LeverageSpec)>,
}

impl LeverageRegistry {
    /// Registry seeded with the fixed leveraged family named in the data
    /// model (§3): `TQQQ`/`SQQQ`/`PSQ` derived from `QQQ`.
    pub fn with_defaults() -> Self {
        let mut specs = HashMap::new();
        specs.insert("TQQQ".to_string(), ("QQQ".to_string(), LeverageSpec { multiplier: 3.0 }));
        specs.insert("SQQQ".to_string(), ("QQQ".to_string(), LeverageSpec { multiplier: -3.0 }));
        specs.insert("PSQ".to_string(), ("QQQ".to_string(), LeverageSpec { multiplier: -1.0 }));
        Self { specs }
    }

    pub fn spec_for(&self, symbol: &str) -> Option<(&str, LeverageSpec)> {
        self.specs.get(symbol).map(|(base, spec)| (base.as_str(), *spec))
    }

    pub fn is_leveraged(&self, symbol: &str) -> bool {
        self.specs.contains_key(symbol)
    }

    /// Synthesizes a leveraged/inverse bar series for `symbol` from its
    /// base series, applying `daily_decay_rate + expense_ratio / 252` as an
    /// additive drag on each day's compounded return (§4.5). Panics if
    /// `symbol` is unregistered or `base_bars` is empty — both are caller
    /// preconditions, never a data-quality issue (§7).
    pub fn generate(&self, symbol: &str, base_bars: &[Bar], daily_decay_rate: f64, expense_ratio: f64) -> Vec<Bar> {
        let (base_symbol, spec) = self
            .spec_for(symbol)
            .unwrap_or_else(|| panic!("no leverage spec registered for symbol {symbol}"));
        assert!(!base_bars.is_empty(), "cannot synthesize {symbol} from an empty base series");
        assert!(
            base_bars.iter().all(|b| b.symbol == base_symbol),
            "base series symbol mismatch: expected {base_symbol}"
        );

        let cost = daily_decay_rate + expense_ratio / 252.0;
        let mut out = Vec::with_capacity(base_bars.len());
        let mut prev_base_close = base_bars[0].close;
        let mut prev_synth_close = spec.starting_price();

        for (i, base) in base_bars.iter().enumerate() {
            let base_return = if i == 0 || prev_base_close == 0.0 { 0.0 } else { base.close / prev_base_close - 1.0 };
            let synth_return = base_return * spec.multiplier;
            let open = prev_synth_close;
            let close = (prev_synth_close * (1.0 + synth_return - cost)).max(0.01);

            let base_range = (base.high - base.low).max(1e-8);
            let high_frac = (base.high - base.open).max(0.0) / base_range;
            let low_frac = (base.open - base.low).max(0.0) / base_range;
            let body_hi = open.max(close);
            let body_lo = open.min(close);
            let high = body_hi + (body_hi - body_lo).max(open * 1e-4) * high_frac;
            let low = (body_lo - (body_hi - body_lo).max(open * 1e-4) * low_frac).max(0.01).min(body_lo);

            out.push(
                Bar::new(base.timestamp_ms, symbol, open, high, low, close, base.volume)
                    .expect("synthesized bar violates OHLC invariants"),
            );

            prev_base_close = base.close;
            prev_synth_close = close;
        }
        out
    }
}

impl Default for LeverageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
