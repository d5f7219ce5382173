//! Errors from configuration loading and path resolution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting is out of range or inconsistent with another
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or relay file is not the JSON shape we expect
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.schdlstr` in
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
