//! Perpetual collection loop.
//!
//! One tokio task per collector: poll, then sleep the interval measured from
//! the end of the cycle. Cycle failures are logged and counted, never
//! propagated, so the loop lives as long as its handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collector::{CollectOutcome, Collector, CollectorError, MIN_INTERVAL};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters updated by the loop.
#[derive(Debug, Default)]
pub struct CollectorStats {
    cycles: AtomicU64,
    saved: AtomicU64,
    duplicates: AtomicU64,
    skipped_off: AtomicU64,
    gateway_failures: AtomicU64,
    storage_failures: AtomicU64,
    last_saved_ts: AtomicU64,
}

/// Point-in-time copy of [`CollectorStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectorStatsSnapshot {
    pub cycles: u64,
    pub saved: u64,
    pub duplicates: u64,
    pub skipped_off: u64,
    pub gateway_failures: u64,
    pub storage_failures: u64,
    /// Unix seconds of the last stored sample (0 if none yet).
    pub last_saved_ts: u64,
}

impl CollectorStats {
    /// Read all counters.
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped_off: self.skipped_off.load(Ordering::Relaxed),
            gateway_failures: self.gateway_failures.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            last_saved_ts: self.last_saved_ts.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running collection loop.
pub struct CollectorHandle {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<CollectorStats>,
}

impl std::fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("name", &self.name)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl CollectorHandle {
    /// Start `collector` on its own task.
    ///
    /// Interval is clamped to a minimum of 1 second. The first cycle runs
    /// immediately.
    pub fn spawn<C: Collector>(collector: C, interval: Duration) -> Self {
        let interval = if interval < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            MIN_INTERVAL
        } else {
            interval
        };

        let name = collector.name().to_string();
        let stats = Arc::new(CollectorStats::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_loop(
            Arc::new(collector),
            interval,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        tracing::info!(collector = %name, interval = ?interval, "Collector started");
        Self {
            name,
            shutdown_tx,
            task,
            stats,
        }
    }

    /// Shared counters, readable while the loop runs.
    pub fn stats(&self) -> Arc<CollectorStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the loop task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop with the default timeout.
    pub async fn shutdown(self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop the loop, aborting an in-flight cycle if it outlives `timeout`.
    pub async fn shutdown_with_timeout(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let abort = self.task.abort_handle();

        match tokio::time::timeout(timeout, self.task).await {
            Ok(_) => tracing::info!(collector = %self.name, "Collector shutdown complete"),
            Err(_) => {
                abort.abort();
                tracing::warn!(collector = %self.name, "Collector shutdown timed out, aborted");
            }
        }
    }
}

async fn run_loop<C: Collector>(
    collector: Arc<C>,
    interval: Duration,
    stats: Arc<CollectorStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        run_cycle(collector.as_ref(), &stats).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // Fires on an explicit stop and when the handle is dropped.
            _ = shutdown_rx.changed() => break,
        }
    }
    tracing::debug!(collector = %collector.name(), "Collector loop exited");
}

/// Execute a single collection cycle and record the result.
async fn run_cycle<C: Collector>(collector: &C, stats: &CollectorStats) {
    let name = collector.name();
    let start = Instant::now();
    stats.cycles.fetch_add(1, Ordering::Relaxed);

    match collector.collect().await {
        Ok(CollectOutcome::Recorded { sample, inserted }) => {
            if inserted {
                stats.saved.fetch_add(1, Ordering::Relaxed);
                stats
                    .last_saved_ts
                    .store(u64::try_from(sample.ts).unwrap_or(0), Ordering::Relaxed);
                tracing::debug!(
                    collector = %name,
                    ts = sample.ts,
                    power_w = sample.power,
                    duration_ms = start.elapsed().as_millis(),
                    "Saved reading"
                );
            } else {
                stats.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(collector = %name, ts = sample.ts, "Reading for this second already stored");
            }
        }
        Ok(CollectOutcome::SkippedOff) => {
            stats.skipped_off.fetch_add(1, Ordering::Relaxed);
            tracing::info!(collector = %name, "Device off, reading not saved");
        }
        Err(CollectorError::Gateway(e)) => {
            stats.gateway_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(collector = %name, error = %e, "Device read failed");
        }
        Err(CollectorError::Storage(e)) => {
            stats.storage_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(collector = %name, error = %e, "Storing reading failed");
        }
    }
}
