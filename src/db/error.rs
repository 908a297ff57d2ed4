use std::time::Duration;

use thiserror::Error;

/// Failures reading from the usage database.
///
/// Any of these is fatal to a run: reports are never built from a partial
/// or unreliable read.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "database-postgres")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;
