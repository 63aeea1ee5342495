//! Database error types.

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Database error type.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish the connection pool.
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Migration run failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Query execution failed.
    #[error("Database error: {0}")]
    Query(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Query(err.to_string())
    }
}
