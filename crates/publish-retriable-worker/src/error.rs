//! Worker error types.

use scheduler_database::DatabaseError;
use thiserror::Error;

/// Errors that abort a publish cycle.
///
/// Relay failures are not among them; those become per-event outcomes.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Reading due events or committing outcomes failed
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias using WorkerError.
pub type WorkerResult<T> = Result<T, WorkerError>;
