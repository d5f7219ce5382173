//! Service error types.

use scheduler_database::DatabaseError;
use thiserror::Error;

/// Errors surfaced to submitters and operators.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The request was rejected before touching the store
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An event with this id is already scheduled
    #[error("Event already scheduled: {0}")]
    Conflict(String),

    /// No event with this id
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(id) => Self::Conflict(id),
            DatabaseError::NotFound(id) => Self::NotFound(id),
            DatabaseError::InvalidData(reason) => Self::InvalidInput(reason),
            other => Self::Database(other),
        }
    }
}

/// Result type alias using ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;
