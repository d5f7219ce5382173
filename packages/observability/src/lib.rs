//! # Observability
//!
//! Logging bootstrap shared by the schdlstr binaries.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and then use
//! plain `tracing` macros. Every event is written as one JSON object per line
//! to an append-only file (`~/.schdlstr/logs/schdlstr.jsonl` unless
//! overridden), so the worker and any CLI invocations running against the same
//! base directory share a single stream:
//!
//! ```text
//! tail -f ~/.schdlstr/logs/schdlstr.jsonl | jq
//! ```
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "publisher".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("publisher started");
//! ```

mod json_layer;
mod sink;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use sink::LogFileWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "publisher", "cli").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.schdlstr/logs/schdlstr.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Falls back to stderr-only output when the log file cannot be opened, so a
/// read-only home directory never prevents the service from starting.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_config(config: LogConfig) {
    sink::init_subscriber(&config);
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};
