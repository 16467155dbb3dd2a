//! Aggregation error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by the query layer.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Bad granularity, date or window parameters. Rejected before any read.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store could not answer.
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

impl AggregateError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
