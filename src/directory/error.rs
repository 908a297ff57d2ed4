use std::time::Duration;

use thiserror::Error;

/// Failures opening or closing a directory session.
///
/// Per-account lookup failures are not errors at this level; they are
/// reported through [`Resolution`](super::Resolution).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to connect to directory: {0}")]
    Connect(String),

    #[error("Directory bind failed: {0}")]
    Bind(String),

    #[error("Directory operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Directory protocol error: {0}")]
    Protocol(String),
}
