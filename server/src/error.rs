//! Error types for the external collaborators the relay consumes.
//!
//! Collaborator failures are never fatal to a connection: callers log them
//! and carry on. HTTP handlers map them to a status code.

use axum::http::StatusCode;

/// Failure reading from or writing to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl From<StoreError> for StatusCode {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store operation failed");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Failure handing a notification to the push gateway.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push gateway rejected notification with status {0}")]
    Rejected(u16),

    #[error("empty device token")]
    MissingToken,
}
