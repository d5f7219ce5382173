//! Transport error types.

use thiserror::Error;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No relay in the batch could be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Asked to connect to an empty relay list
    #[error("No relays configured")]
    NoRelays,

    /// Stored payload is not a usable signed event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event reached no relay
    #[error("Publish failed: {0}")]
    Publish(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
