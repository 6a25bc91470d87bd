//! Equity PSM engine: bar storage, rolling indicators, a seven-detector
//! signal aggregator, an adaptive-threshold position state machine, a
//! portfolio executor with pluggable cost models, leveraged/inverse data
//! synthesis, and the run orchestrator tying them together.

pub mod auditor;
pub mod bar;
pub mod config;
pub mod cost_model;
pub mod executor;
pub mod indicators;
pub mod io;
pub mod leverage;
pub mod logging;
pub mod orchestrator;
pub mod portfolio;
pub mod psm;
pub mod scalper;
pub mod signals;
pub mod threshold;
pub mod trade_log;
