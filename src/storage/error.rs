//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. Every variant is
//! treated as transient by the collector (logged, retried next tick) and is
//! surfaced as `storage_unavailable` by the query paths.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error, lock contention, disk I/O).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The storage call did not complete within its bound.
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid data passed to or read from the database.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Internal error (e.g., directory creation failure).
    #[error("internal error: {0}")]
    Internal(String),
}
