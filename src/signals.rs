//! Signal aggregator (C4) — seven independent probability detectors fused
//! by weighted log-odds into a single `(probability, confidence)` pair.
//!
//! Detector functions follow the teacher's `signals.rs` convention of small
//! pure functions over an indicator snapshot (`momentum_signal`,
//! `trend_signal`, ...), but here each returns a probability in `(0,1)`
//! rather than a direction/strength pair, per spec §4.1.

use std::collections::HashMap;

use crate::bar::Bar;
use crate::indicators::{IndicatorCache, IndicatorSnapshot};

/// A fused per-bar directional probability signal (data model §3).
#[derive(Debug, Clone)]
pub struct Signal {
    pub timestamp_ms: i64,
    pub bar_index: usize,
    pub symbol: String,
    pub probability: f64,
    pub confidence: f64,
    pub strategy_name: String,
    pub strategy_version: String,
    pub metadata: HashMap<String, String>,
}

impl Signal {
    /// Panics if probability/confidence are out of range or non-finite —
    /// per spec §3 this is a fatal classification error, never recovered.
    pub fn assert_valid(&self) {
        assert!(
            self.probability.is_finite() && (0.0..=1.0).contains(&self.probability),
            "invalid signal probability: {}",
            self.probability
        );
        assert!(
            self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence),
            "invalid signal confidence: {}",
            self.confidence
        );
    }
}

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn clip01(x: f64) -> f64 {
    clip(x, 0.0, 1.0)
}

fn logit(p: f64) -> f64 {
    let p = clip(p, 1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Weights for the seven detectors in the log-odds fusion.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub boll: f64,
    pub rsi: f64,
    pub mom: f64,
    pub vwap: f64,
    pub orb: f64,
    pub ofi: f64,
    pub vol: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self { boll: 1.0, rsi: 1.0, mom: 1.0, vwap: 1.0, orb: 1.0, ofi: 1.0, vol: 1.0 }
    }
}

/// Raw per-detector probabilities, exposed for testing and metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorOutputs {
    pub p_boll: f64,
    pub p_rsi: f64,
    pub p_mom: f64,
    pub p_vwap: f64,
    pub p_orb: f64,
    pub p_ofi: f64,
    pub p_vol: f64,
}

impl DetectorOutputs {
    fn as_array(&self) -> [f64; 7] {
        [self.p_boll, self.p_rsi, self.p_mom, self.p_vwap, self.p_orb, self.p_ofi, self.p_vol]
    }
}

/// Bollinger z-score of close vs the 20-bar SMA/σ: higher close above the
/// mean maps to a higher probability.
pub fn p_boll(close: f64, snap: &IndicatorSnapshot) -> f64 {
    if snap.bars_seen < 20 || snap.std20 <= 0.0 {
        return 0.5;
    }
    let z = (close - snap.sma20) / snap.std20;
    0.5 + 0.5 * (z / 2.0).tanh()
}

/// 14-period RSI mapped linearly around 50.
pub fn p_rsi(snap: &IndicatorSnapshot) -> f64 {
    if snap.bars_seen < 14 {
        return 0.5;
    }
    0.5 + (snap.rsi14 - 50.0) / 100.0
}

/// Window-10 return mapped through tanh.
pub fn p_mom(snap: &IndicatorSnapshot) -> f64 {
    if snap.bars_seen < 11 {
        return 0.5;
    }
    0.5 + 0.5 * (snap.mom10 * 50.0).tanh()
}

/// 20-bar VWAP mean-reversion bias.
pub fn p_vwap(close: f64, snap: &IndicatorSnapshot) -> f64 {
    if snap.bars_seen < 20 || snap.vwap20 == 0.0 {
        return 0.5;
    }
    0.5 - 0.5 * ((close - snap.vwap20) / snap.vwap20.abs()).tanh()
}

/// Opening-range breakout over the first 30 bars of the UTC day.
pub fn p_orb(close: f64, snap: &IndicatorSnapshot) -> f64 {
    if !snap.orb_ready {
        return 0.5;
    }
    if close > snap.orb_high {
        0.7
    } else if close < snap.orb_low {
        0.3
    } else {
        0.5
    }
}

/// Bar-geometry order-flow proxy.
pub fn p_ofi(bar: &Bar) -> f64 {
    let range = (bar.high - bar.low).max(1e-8);
    0.5 + 0.25 * ((bar.close - bar.open) / range) * (bar.volume / 1e6).tanh()
}

/// Volume-surge scaled by momentum direction.
pub fn p_vol(bar: &Bar, snap: &IndicatorSnapshot) -> f64 {
    if snap.bars_seen < 20 {
        return 0.5;
    }
    let ratio = if snap.volume_sma20 > 0.0 { bar.volume / snap.volume_sma20 } else { 1.0 };
    let mom = p_mom(snap);
    let adj = 0.25 * (ratio - 1.0).tanh() * (mom - 0.5).signum();
    0.5 + adj
}

/// Evaluate all seven detectors for a bar + its freshly-updated snapshot.
pub fn evaluate_detectors(bar: &Bar, snap: &IndicatorSnapshot) -> DetectorOutputs {
    DetectorOutputs {
        p_boll: p_boll(bar.close, snap),
        p_rsi: p_rsi(snap),
        p_mom: p_mom(snap),
        p_vwap: p_vwap(bar.close, snap),
        p_orb: p_orb(bar.close, snap),
        p_ofi: p_ofi(bar),
        p_vol: p_vol(bar, snap),
    }
}

/// Weighted log-odds fusion (§4.1).
pub fn fuse(outputs: &DetectorOutputs, weights: &Weights, sharpness: f64) -> f64 {
    let total_weight = weights.boll + weights.rsi + weights.mom + weights.vwap + weights.orb + weights.ofi + weights.vol;
    if total_weight <= 0.0 {
        return 0.5;
    }
    let l = (weights.boll * logit(outputs.p_boll)
        + weights.rsi * logit(outputs.p_rsi)
        + weights.mom * logit(outputs.p_mom)
        + weights.vwap * logit(outputs.p_vwap)
        + weights.orb * logit(outputs.p_orb)
        + weights.ofi * logit(outputs.p_ofi)
        + weights.vol * logit(outputs.p_vol))
        / total_weight;
    sigmoid(sharpness * l)
}

/// Confidence from detector agreement and peak strength (§4.1).
pub fn confidence(outputs: &DetectorOutputs) -> f64 {
    let arr = outputs.as_array();
    let bullish = arr.iter().filter(|&&p| p > 0.5).count();
    let bearish = arr.iter().filter(|&&p| p < 0.5).count();
    let agreement = bullish.max(bearish) as f64 / arr.len() as f64;
    let max_strength = arr.iter().map(|p| (p - 0.5).abs()).fold(0.0_f64, f64::max);
    clip01(0.4 + 0.6 * agreement.max(max_strength))
}

/// Owns the rolling indicator state for one symbol and turns bars into
/// fused signals once warmed up.
pub struct SignalAggregator {
    cache: IndicatorCache,
    weights: Weights,
    sharpness: f64,
    warmup_bars: usize,
    strategy_name: String,
    strategy_version: String,
}

impl SignalAggregator {
    pub fn new(weights: Weights, sharpness: f64, warmup_bars: usize) -> Self {
        Self {
            cache: IndicatorCache::new(),
            weights,
            sharpness,
            warmup_bars,
            strategy_name: "sigor".to_string(),
            strategy_version: "1.0.0".to_string(),
        }
    }

    /// Returns `None` before `warmup_bars` have been observed, per §4.1.
    pub fn on_bar(&mut self, bar: &Bar, bar_index: usize, market_data_path: &str) -> Option<Signal> {
        let snap = self.cache.update(bar);
        if snap.bars_seen < self.warmup_bars {
            return None;
        }
        let outputs = evaluate_detectors(bar, &snap);
        let probability = fuse(&outputs, &self.weights, self.sharpness);
        let conf = confidence(&outputs);

        let mut metadata = HashMap::new();
        metadata.insert("market_data_path".to_string(), market_data_path.to_string());

        let signal = Signal {
            timestamp_ms: bar.timestamp_ms,
            bar_index,
            symbol: bar.symbol.clone(),
            probability: clip01(probability),
            confidence: clip01(conf),
            strategy_name: self.strategy_name.clone(),
            strategy_version: self.strategy_version.clone(),
            metadata,
        };
        signal.assert_valid();
        Some(signal)
    }
}
