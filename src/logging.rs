//! Structured JSON logging for the trading pipeline.
//!
//! Design goals carried over from the teacher's logging module:
//! 1. Multi-level granularity (TRACE -> FATAL)
//! 2. Domain-specific categories for filtering
//! 3. Deterministic run-scoped timestamps and sequence numbers for replay

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

/// Log categories for filtering, mapped onto this pipeline's components
/// rather than the teacher's live-exchange domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market,    // bars, indicators
    Signal,    // detector outputs, fused signals
    Psm,       // state classification, transitions
    Exec,      // order evaluation, fills
    Portfolio, // cash/position/equity updates
    System,    // run startup/shutdown, config
    Audit,     // trade log, Sharpe/drawdown summaries
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Market => "market",
            Domain::Signal => "signal",
            Domain::Psm => "psm",
            Domain::Exec => "exec",
            Domain::Portfolio => "portfolio",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id =
            std::env::var("RUN_ID").unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {err}");
        }
        let events_path = run_dir.join("events.jsonl");
        let manifest_path = run_dir.join("manifest.json");

        let _ = std::fs::write(
            manifest_path,
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let events = File::create(events_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create events log: {err}");
            File::create("/tmp/equity-psm-engine-events.jsonl").expect("events fallback")
        });

        RunContext { run_id, events: Mutex::new(BufWriter::new(events)) }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["symbol", "state", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{line}");
    }
}

/// RFC3339 timestamp with milliseconds.
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds, for correlating log lines with bar timestamps.
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

/// Compatibility entry point for call sites that only have a module name,
/// not a `Domain`.
pub fn json_log(module: &str, mut fields: Map<String, Value>) {
    fields.insert("ts".to_string(), Value::String(ts_now()));
    fields.insert("module".to_string(), Value::String(module.to_string()));
    emit_record(Level::Info, module, module, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    write_line(&ctx.events, &line);
    println!("{line}");
}

/// Log a PSM transition decision.
pub fn log_transition(symbol: &str, state: &str, signal_class: &str, target: &str, action: &str) {
    log(
        Level::Info,
        Domain::Psm,
        "transition",
        obj(&[
            ("symbol", v_str(symbol)),
            ("state", v_str(state)),
            ("signal_class", v_str(signal_class)),
            ("target", v_str(target)),
            ("action", v_str(action)),
        ]),
    );
}

/// Log an executed trade.
pub fn log_trade(symbol: &str, side: &str, quantity: f64, price: f64, fee: f64, realized_pnl: f64) {
    log(
        Level::Info,
        Domain::Exec,
        "trade",
        obj(&[
            ("symbol", v_str(symbol)),
            ("side", v_str(side)),
            ("quantity", v_num(quantity)),
            ("price", v_num(price)),
            ("fee", v_num(fee)),
            ("realized_pnl", v_num(realized_pnl)),
        ]),
    );
}

/// Log a HOLD decision: no trade was produced, but a reason was recorded
/// (neutral zone, business rejection, or veto).
pub fn log_hold(symbol: &str, execution_reason: &str, rejection_reason: Option<&str>) {
    log(
        Level::Info,
        Domain::Exec,
        "hold",
        obj(&[
            ("symbol", v_str(symbol)),
            ("execution_reason", v_str(execution_reason)),
            ("rejection_reason", rejection_reason.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

/// The run-scoped identifier stamped on every trade record, shared with
/// the structured event log so both can be correlated (§6).
pub fn current_run_id() -> String {
    ensure_run_context().run_id.clone()
}

/// Log the end-of-run audit summary.
pub fn log_run_summary(total_trades: u64, sharpe: f64, max_drawdown: f64, final_equity: f64) {
    log(
        Level::Info,
        Domain::Audit,
        "run_summary",
        obj(&[
            ("total_trades", json!(total_trades)),
            ("sharpe", v_num(sharpe)),
            ("max_drawdown", v_num(max_drawdown)),
            ("final_equity", v_num(final_equity)),
        ]),
    );
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}
