//! Storage errors.

use thiserror::Error;

/// Errors from the scheduled event store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The executor thread is gone or the file could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// A schema step failed; the database stays at the previous version
    #[error("Migration error: {0}")]
    Migration(String),

    /// An event with this id is already stored
    #[error("Event already scheduled: {0}")]
    Conflict(String),

    #[error("Event not found: {0}")]
    NotFound(String),

    /// Creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value was rejected before it reached SQL
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
