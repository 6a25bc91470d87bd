//! Bar and signal I/O (§6): CSV bar ingestion and JSONL signal logs.
//! Kept deliberately small — file-format parsing beyond these two shapes
//! is out of scope.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::bar::{Bar, BarSeries};
use crate::signals::Signal;

/// Parses a timestamp column that is either epoch milliseconds or an
/// RFC3339/ISO-8601 string (§6 "timestamp formats").
fn parse_timestamp(field: &str) -> Result<i64> {
    if let Ok(ms) = field.parse::<i64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(field).with_context(|| format!("unparseable timestamp: {field}"))?;
    Ok(parsed.timestamp_millis())
}

/// Reads a CSV file with header `timestamp,symbol,open,high,low,close,volume`
/// (symbol may be omitted if given externally via `default_symbol`) into a
/// single-symbol [`BarSeries`].
pub fn read_bar_csv(path: impl AsRef<Path>, default_symbol: Option<&str>) -> Result<BarSeries> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening bar CSV {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = lines.next().context("bar CSV is empty, missing header")??;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let col_index = |name: &str| columns.iter().position(|c| c.eq_ignore_ascii_case(name));

    let ts_idx = col_index("timestamp").context("bar CSV missing `timestamp` column")?;
    let symbol_idx = col_index("symbol");
    let open_idx = col_index("open").context("bar CSV missing `open` column")?;
    let high_idx = col_index("high").context("bar CSV missing `high` column")?;
    let low_idx = col_index("low").context("bar CSV missing `low` column")?;
    let close_idx = col_index("close").context("bar CSV missing `close` column")?;
    let volume_idx = col_index("volume").context("bar CSV missing `volume` column")?;

    let mut series = BarSeries::new(default_symbol.unwrap_or(""));
    for (line_no, line) in lines.enumerate() {
        let line = line.with_context(|| format!("reading line {} of {}", line_no + 2, path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let symbol = match symbol_idx {
            Some(idx) => fields.get(idx).copied().unwrap_or_default().to_string(),
            None => default_symbol
                .with_context(|| format!("line {} has no symbol column and no default symbol was given", line_no + 2))?
                .to_string(),
        };
        let timestamp_ms = parse_timestamp(field(&fields, ts_idx, line_no)?)?;
        let open: f64 = field(&fields, open_idx, line_no)?.parse().context("parsing open")?;
        let high: f64 = field(&fields, high_idx, line_no)?.parse().context("parsing high")?;
        let low: f64 = field(&fields, low_idx, line_no)?.parse().context("parsing low")?;
        let close: f64 = field(&fields, close_idx, line_no)?.parse().context("parsing close")?;
        let volume: f64 = field(&fields, volume_idx, line_no)?.parse().context("parsing volume")?;

        let bar = Bar::new(timestamp_ms, symbol, open, high, low, close, volume)?;
        series.push(bar)?;
    }
    Ok(series)
}

fn field<'a>(fields: &'a [&str], idx: usize, line_no: usize) -> Result<&'a str> {
    fields.get(idx).copied().with_context(|| format!("line {} is missing a column", line_no + 2))
}

/// Flat JSON-serializable view of a [`Signal`] for the JSONL signal log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignalRecord {
    timestamp_ms: i64,
    bar_index: usize,
    symbol: String,
    probability: f64,
    confidence: f64,
    strategy_name: String,
    strategy_version: String,
    metadata: BTreeMap<String, String>,
}

impl From<&Signal> for SignalRecord {
    fn from(s: &Signal) -> Self {
        Self {
            timestamp_ms: s.timestamp_ms,
            bar_index: s.bar_index,
            symbol: s.symbol.clone(),
            probability: s.probability,
            confidence: s.confidence,
            strategy_name: s.strategy_name.clone(),
            strategy_version: s.strategy_version.clone(),
            metadata: s.metadata.clone().into_iter().collect(),
        }
    }
}

/// Appends one signal as a JSON line (§6).
pub fn append_signal(path: impl AsRef<Path>, signal: &Signal) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening signal log {}", path.display()))?;
    let record = SignalRecord::from(signal);
    let line = serde_json::to_string(&record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads every signal record back as raw JSON values (no re-hydration of
/// `Signal`, since the log is a write-once audit artifact).
pub fn read_signal_log(path: impl AsRef<Path>) -> Result<Vec<serde_json::Value>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening signal log {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)?;
        records.push(value);
    }
    Ok(records)
}

/// Fails loudly rather than silently defaulting when a required price is
/// missing from a bar snapshot (used by the orchestrator to build the
/// `prices` map the executor needs).
pub fn require_price(prices: &BTreeMap<String, f64>, symbol: &str) -> Result<f64> {
    prices.get(symbol).copied().ok_or_else(|| anyhow::anyhow!("no price available for {symbol}"))
}
