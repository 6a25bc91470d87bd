//! Rolling indicator cache (C3) — stateful windows updated once per bar.
//!
//! Adapted from the teacher's `indicators.rs`: `Sma`/`RollingStd`/`Rsi` are
//! kept verbatim in spirit (incremental windowed stats), with `Vwap` and
//! `OpeningRange` added for the detectors this spec needs. Buffers are
//! bounded per spec §5 (cap 2048) rather than the unbounded teacher default.

use std::collections::VecDeque;

use crate::bar::Bar;

const MAX_WINDOW: usize = 2048;

/// Simple moving average with a fixed window.
#[derive(Debug, Clone)]
pub struct Sma {
    window: VecDeque<f64>,
    period: usize,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { window: VecDeque::with_capacity(period.min(MAX_WINDOW)), period, sum: 0.0 }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        self.sum += value;
        self.window.push_back(value);
        if self.window.len() > self.period {
            self.sum -= self.window.pop_front().unwrap_or(0.0);
        }
        self.get()
    }

    pub fn get(&self) -> f64 {
        if self.window.is_empty() { 0.0 } else { self.sum / self.window.len() as f64 }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.period
    }
}

/// Rolling (sample) standard deviation over a fixed window.
#[derive(Debug, Clone)]
pub struct RollingStd {
    window: VecDeque<f64>,
    period: usize,
}

impl RollingStd {
    pub fn new(period: usize) -> Self {
        Self { window: VecDeque::with_capacity(period.min(MAX_WINDOW)), period }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.get()
    }

    pub fn get(&self) -> f64 {
        let n = self.window.len() as f64;
        if n < 2.0 {
            return 0.0;
        }
        let mean = self.window.iter().sum::<f64>() / n;
        let m2 = self.window.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        (m2 / (n - 1.0)).sqrt()
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.period
    }
}

/// Wilder-smoothed Relative Strength Index.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: f64,
    avg_loss: f64,
    prev_price: Option<f64>,
    count: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period, avg_gain: 0.0, avg_loss: 0.0, prev_price: None, count: 0 }
    }

    pub fn update(&mut self, price: f64) -> f64 {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            self.count += 1;
            if self.count <= self.period {
                self.avg_gain = (self.avg_gain * (self.count - 1) as f64 + gain) / self.count as f64;
                self.avg_loss = (self.avg_loss * (self.count - 1) as f64 + loss) / self.count as f64;
            } else {
                let alpha = 1.0 / self.period as f64;
                self.avg_gain = self.avg_gain * (1.0 - alpha) + gain * alpha;
                self.avg_loss = self.avg_loss * (1.0 - alpha) + loss * alpha;
            }
        }
        self.prev_price = Some(price);
        self.get()
    }

    pub fn get(&self) -> f64 {
        if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        }
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }
}

/// Rolling volume-weighted average price over typical price.
#[derive(Debug, Clone)]
pub struct Vwap {
    period: usize,
    tp_vol: VecDeque<(f64, f64)>,
    sum_tp_vol: f64,
    sum_vol: f64,
}

impl Vwap {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            tp_vol: VecDeque::with_capacity(period.min(MAX_WINDOW)),
            sum_tp_vol: 0.0,
            sum_vol: 0.0,
        }
    }

    pub fn update(&mut self, typical_price: f64, volume: f64) -> f64 {
        self.tp_vol.push_back((typical_price, volume));
        self.sum_tp_vol += typical_price * volume;
        self.sum_vol += volume;
        if self.tp_vol.len() > self.period {
            if let Some((tp, vol)) = self.tp_vol.pop_front() {
                self.sum_tp_vol -= tp * vol;
                self.sum_vol -= vol;
            }
        }
        self.get()
    }

    pub fn get(&self) -> f64 {
        if self.sum_vol > 0.0 { self.sum_tp_vol / self.sum_vol } else { 0.0 }
    }

    pub fn is_ready(&self) -> bool {
        self.tp_vol.len() >= self.period
    }
}

/// Opening-range tracker: high/low of the first `bars_per_session` bars of
/// each UTC calendar day (day bucket resets the window).
#[derive(Debug, Clone)]
pub struct OpeningRange {
    bars_per_session: usize,
    current_day: Option<i64>,
    bars_in_day: usize,
    range_high: f64,
    range_low: f64,
}

impl OpeningRange {
    pub fn new(bars_per_session: usize) -> Self {
        Self {
            bars_per_session,
            current_day: None,
            bars_in_day: 0,
            range_high: f64::NEG_INFINITY,
            range_low: f64::INFINITY,
        }
    }

    pub fn update(&mut self, day_bucket: i64, high: f64, low: f64) {
        if self.current_day != Some(day_bucket) {
            self.current_day = Some(day_bucket);
            self.bars_in_day = 0;
            self.range_high = f64::NEG_INFINITY;
            self.range_low = f64::INFINITY;
        }
        if self.bars_in_day < self.bars_per_session {
            self.range_high = self.range_high.max(high);
            self.range_low = self.range_low.min(low);
        }
        self.bars_in_day += 1;
    }

    pub fn is_ready(&self) -> bool {
        self.bars_in_day >= self.bars_per_session
    }

    pub fn high(&self) -> f64 {
        self.range_high
    }

    pub fn low(&self) -> f64 {
        self.range_low
    }
}

/// Snapshot of every rolling indicator needed by the signal detectors,
/// taken immediately after a bar update.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorSnapshot {
    pub sma20: f64,
    pub std20: f64,
    pub rsi14: f64,
    pub vwap20: f64,
    pub mom10: f64,
    pub volume_sma20: f64,
    pub orb_high: f64,
    pub orb_low: f64,
    pub orb_ready: bool,
    pub bars_seen: usize,
}

/// Owns all rolling windows for one symbol and produces an
/// [`IndicatorSnapshot`] once per bar.
#[derive(Debug, Clone)]
pub struct IndicatorCache {
    sma20: Sma,
    std20: RollingStd,
    rsi14: Rsi,
    vwap20: Vwap,
    volume_sma20: Sma,
    orb: OpeningRange,
    closes: VecDeque<f64>,
    bars_seen: usize,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self {
            sma20: Sma::new(20),
            std20: RollingStd::new(20),
            rsi14: Rsi::new(14),
            vwap20: Vwap::new(20),
            volume_sma20: Sma::new(20),
            orb: OpeningRange::new(30),
            closes: VecDeque::with_capacity(16),
            bars_seen: 0,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> IndicatorSnapshot {
        self.bars_seen += 1;
        let sma20 = self.sma20.update(bar.close);
        let std20 = self.std20.update(bar.close);
        let rsi14 = self.rsi14.update(bar.close);
        let vwap20 = self.vwap20.update(bar.typical_price(), bar.volume);
        let volume_sma20 = self.volume_sma20.update(bar.volume);
        self.orb.update(bar.day_bucket(), bar.high, bar.low);

        self.closes.push_back(bar.close);
        if self.closes.len() > 11 {
            self.closes.pop_front();
        }
        let mom10 = if self.closes.len() >= 11 {
            let then = self.closes[0];
            if then != 0.0 { bar.close / then - 1.0 } else { 0.0 }
        } else {
            0.0
        };

        IndicatorSnapshot {
            sma20,
            std20,
            rsi14,
            vwap20,
            mom10,
            volume_sma20,
            orb_high: self.orb.high(),
            orb_low: self.orb.low(),
            orb_ready: self.orb.is_ready(),
            bars_seen: self.bars_seen,
        }
    }
}

impl Default for IndicatorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, "QQQ", close, close + 1.0, close - 1.0, close, 1_000.0).unwrap()
    }

    #[test]
    fn sma_tracks_window_average() {
        let mut sma = Sma::new(3);
        sma.update(1.0);
        sma.update(2.0);
        assert_eq!(sma.update(3.0), 2.0);
        assert_eq!(sma.update(6.0), (2.0 + 3.0 + 6.0) / 3.0);
    }

    #[test]
    fn rsi_is_50_with_no_changes() {
        let mut rsi = Rsi::new(14);
        for _ in 0..20 {
            rsi.update(100.0);
        }
        assert!((rsi.get() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn opening_range_resets_on_new_day() {
        let mut orb = OpeningRange::new(2);
        orb.update(0, 110.0, 90.0);
        orb.update(0, 120.0, 95.0);
        assert!(orb.is_ready());
        assert_eq!(orb.high(), 120.0);
        orb.update(1, 50.0, 40.0);
        assert!(!orb.is_ready());
        assert_eq!(orb.high(), 50.0);
    }

    #[test]
    fn cache_reports_bars_seen_and_momentum() {
        let mut cache = IndicatorCache::new();
        let mut snap = IndicatorSnapshot::default();
        for i in 0..12 {
            snap = cache.update(&bar(i + 1, 100.0 + i as f64));
        }
        assert_eq!(snap.bars_seen, 12);
        assert!(snap.mom10 > 0.0);
    }
}
