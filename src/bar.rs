//! Immutable OHLCV bars and the append-only per-symbol bar store.

use anyhow::{bail, Result};

/// A single OHLCV observation. Bars are never mutated once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp_ms: i64,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Validates the OHLC/volume invariants from the data model before
    /// constructing the bar. A malformed row is a data error, not a
    /// programmer bug, so this returns `Result` rather than panicking.
    pub fn new(
        timestamp_ms: i64,
        symbol: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self> {
        if !(low > 0.0) {
            bail!("bar low must be > 0, got {low}");
        }
        if volume < 0.0 {
            bail!("bar volume must be >= 0, got {volume}");
        }
        let lo = low;
        let hi = high;
        let body_min = open.min(close);
        let body_max = open.max(close);
        if !(lo <= body_min && body_min <= body_max && body_max <= hi) {
            bail!(
                "bar geometry invariant violated: low={lo} open={open} close={close} high={hi}"
            );
        }
        Ok(Self {
            timestamp_ms,
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// UTC calendar-day bucket used by the opening-range-breakout detector.
    pub fn day_bucket(&self) -> i64 {
        self.timestamp_ms.div_euclid(86_400_000)
    }
}

/// An append-only, time-ordered sequence of bars for a single symbol.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), bars: Vec::new() }
    }

    /// Appends a bar, enforcing strictly increasing timestamps per symbol.
    pub fn push(&mut self, bar: Bar) -> Result<()> {
        if !self.symbol.is_empty() && bar.symbol != self.symbol {
            bail!("symbol mismatch: series is {} got {}", self.symbol, bar.symbol);
        }
        if self.symbol.is_empty() {
            self.symbol = bar.symbol.clone();
        }
        if let Some(last) = self.bars.last() {
            if bar.timestamp_ms <= last.timestamp_ms {
                bail!(
                    "non-increasing timestamp: last={} new={}",
                    last.timestamp_ms,
                    bar.timestamp_ms
                );
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// The half-open window `[start, end)` such that the last
    /// `blocks * block_size` bars are covered, clamped to available data.
    pub fn window_for_blocks(&self, blocks: usize, block_size: usize) -> (usize, usize) {
        let end = self.bars.len();
        let span = blocks.saturating_mul(block_size);
        let start = end.saturating_sub(span);
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_geometry() {
        let err = Bar::new(1, "QQQ", 10.0, 9.0, 8.0, 9.5, 100.0).unwrap_err();
        assert!(err.to_string().contains("geometry"));
    }

    #[test]
    fn rejects_zero_low() {
        let err = Bar::new(1, "QQQ", 10.0, 11.0, 0.0, 10.0, 100.0).unwrap_err();
        assert!(err.to_string().contains("low"));
    }

    #[test]
    fn accepts_valid_bar() {
        let bar = Bar::new(1, "QQQ", 10.0, 11.0, 9.0, 10.5, 100.0).unwrap();
        assert_eq!(bar.symbol, "QQQ");
    }

    #[test]
    fn series_enforces_monotonic_timestamps() {
        let mut series = BarSeries::new("QQQ");
        series.push(Bar::new(1, "QQQ", 10.0, 11.0, 9.0, 10.0, 1.0).unwrap()).unwrap();
        let err = series
            .push(Bar::new(1, "QQQ", 10.0, 11.0, 9.0, 10.0, 1.0).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn series_rejects_symbol_mismatch() {
        let mut series = BarSeries::new("QQQ");
        let err = series
            .push(Bar::new(1, "TQQQ", 10.0, 11.0, 9.0, 10.0, 1.0).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("symbol"));
    }

    #[test]
    fn window_for_blocks_clamps_to_available_data() {
        let mut series = BarSeries::new("QQQ");
        for i in 0..100 {
            series
                .push(Bar::new(i + 1, "QQQ", 10.0, 11.0, 9.0, 10.0, 1.0).unwrap())
                .unwrap();
        }
        assert_eq!(series.window_for_blocks(1, 480), (0, 100));
        assert_eq!(series.window_for_blocks(100, 1), (0, 100));
    }
}
