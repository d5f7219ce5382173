//! Logging initialization.
//!
//! Thin wrapper over the observability crate so every entry point configures
//! tracing the same way: JSONL lines appended to the shared log file, with a
//! compact copy on stderr.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize logging for a schdlstr process.
///
/// * `service_name` - Tag written on every line ("publisher", "cli", ...)
/// * `level` - Default level; `RUST_LOG` takes precedence when set
/// * `log_path` - JSONL destination, usually [`crate::Paths::log_file`]
pub fn init_logging(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_lowercase(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
