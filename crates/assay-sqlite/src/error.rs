//! Error types for SQLite storage

use assay_core::PortError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Graph payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking task driving the connection panicked or was cancelled
    #[error("Blocking task failed: {0}")]
    Task(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<SqliteError> for PortError {
    fn from(err: SqliteError) -> Self {
        let message = err.to_string();
        match err {
            SqliteError::Rusqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
                match failure.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                        Self::Unavailable(message)
                    }
                    ErrorCode::ConstraintViolation => Self::Conflict(message),
                    _ => Self::Backend(message),
                }
            }
            SqliteError::Serialization(_) => Self::Serialization(message),
            _ => Self::Backend(message),
        }
    }
}
