//! Core collector traits and types.

use std::time::Duration;

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::storage::{Sample, StorageError};

/// Fixed sampling cadence. Energy and runtime estimates assume every stored
/// sample stands for exactly this much time.
pub const SAMPLING_INTERVAL: Duration = Duration::from_secs(15);

/// Minimum allowed interval (1 second). Timestamps are whole seconds, so a
/// faster loop would only produce duplicate keys.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur during one collection cycle.
///
/// Both kinds are transient: the runner logs them and tries again next tick.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Reading the device failed (network, auth, malformed response, timeout).
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Writing the sample failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectOutcome {
    /// The device was on and a sample was written, or was already present
    /// for that second (`inserted == false`).
    Recorded { sample: Sample, inserted: bool },
    /// The device reported off; nothing was written.
    SkippedOff,
}

/// Core collector trait.
///
/// # Error Handling
///
/// `collect()` performs one poll-and-store cycle and reports failures instead
/// of retrying. The runner owns the cadence and decides what a failure means
/// for the loop (nothing: it logs and waits for the next tick).
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Perform one collection cycle.
    async fn collect(&self) -> Result<CollectOutcome, CollectorError>;
}
