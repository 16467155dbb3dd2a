//! User-facing storage facades.
//!
//! - `SampleWriter`: the only write path, used by the collector
//! - `SampleReader`: range reads and the specialized aggregate reads used by
//!   the aggregator
//!
//! Every call is a single statement and is bounded by the configured timeout.

use std::future::Future;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{BucketGroup, Sample};

// =============================================================================
// Constants
// =============================================================================

/// Default bound on any single storage call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a storage future under a timeout.
async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(StorageError::from),
        Err(_) => Err(StorageError::Timeout(limit)),
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Idempotent sample writer.
#[derive(Clone)]
pub struct SampleWriter {
    pool: SqlitePool,
    timeout: Duration,
}

impl std::fmt::Debug for SampleWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleWriter").finish_non_exhaustive()
    }
}

impl SampleWriter {
    pub(crate) fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Insert a sample unless one already exists for the same second.
    ///
    /// Returns `true` when a row was written and `false` when the timestamp was
    /// already taken. A duplicate is not an error; the first write wins.
    pub async fn upsert_sample(&self, sample: &Sample) -> Result<bool, StorageError> {
        let result = bounded(
            self.timeout,
            sqlx::query(
                "INSERT INTO readings (ts, voltage, current, power) VALUES (?, ?, ?, ?)
                 ON CONFLICT(ts) DO NOTHING",
            )
            .bind(sample.ts)
            .bind(sample.voltage)
            .bind(sample.current)
            .bind(sample.power)
            .execute(self.pool.inner()),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read-only access to stored samples.
#[derive(Clone)]
pub struct SampleReader {
    pool: SqlitePool,
    timeout: Duration,
}

impl std::fmt::Debug for SampleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleReader").finish_non_exhaustive()
    }
}

impl SampleReader {
    pub(crate) fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Samples with `start <= ts <= end_inclusive`, ascending by timestamp.
    pub async fn query_range(
        &self,
        start: i64,
        end_inclusive: i64,
    ) -> Result<Vec<Sample>, StorageError> {
        let rows: Vec<(i64, f64, f64, f64)> = bounded(
            self.timeout,
            sqlx::query_as(
                "SELECT ts, voltage, current, power FROM readings
                 WHERE ts >= ? AND ts <= ?
                 ORDER BY ts ASC",
            )
            .bind(start)
            .bind(end_inclusive)
            .fetch_all(self.pool.inner()),
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ts, voltage, current, power)| Sample {
                ts,
                voltage,
                current,
                power,
            })
            .collect())
    }

    /// Sum of `power` over samples with `ts >= start` (0 when there are none).
    pub async fn sum_power_since(&self, start: i64) -> Result<f64, StorageError> {
        let row: (f64,) = bounded(
            self.timeout,
            sqlx::query_as("SELECT COALESCE(SUM(power), 0.0) FROM readings WHERE ts >= ?")
                .bind(start)
                .fetch_one(self.pool.inner()),
        )
        .await?;
        Ok(row.0)
    }

    /// Number of samples with `ts >= start` and `power > threshold`.
    pub async fn count_power_above(&self, threshold: f64, start: i64) -> Result<u64, StorageError> {
        let row: (i64,) = bounded(
            self.timeout,
            sqlx::query_as("SELECT COUNT(*) FROM readings WHERE ts >= ? AND power > ?")
                .bind(start)
                .bind(threshold)
                .fetch_one(self.pool.inner()),
        )
        .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Group samples in `[start, end_inclusive]` into buckets of `width`
    /// seconds aligned to `origin`, without loading the rows themselves.
    ///
    /// Only non-empty buckets are returned, ascending by start.
    pub async fn bucket_groups(
        &self,
        start: i64,
        end_inclusive: i64,
        width: i64,
        origin: i64,
    ) -> Result<Vec<BucketGroup>, StorageError> {
        if width <= 0 {
            return Err(StorageError::InvalidData(format!(
                "bucket width must be positive, got {width}"
            )));
        }
        if start < origin {
            // SQLite integer division truncates toward zero, which would
            // misalign buckets left of the origin.
            return Err(StorageError::InvalidData(format!(
                "window start {start} precedes bucket origin {origin}"
            )));
        }

        let rows: Vec<(i64, i64, f64)> = bounded(
            self.timeout,
            sqlx::query_as(
                "SELECT ((ts - ?) / ?) * ? + ? AS bucket_ts,
                        COUNT(*) AS n,
                        COALESCE(SUM(power), 0.0) AS sum_power
                 FROM readings
                 WHERE ts >= ? AND ts <= ?
                 GROUP BY bucket_ts
                 ORDER BY bucket_ts",
            )
            .bind(origin)
            .bind(width)
            .bind(width)
            .bind(origin)
            .bind(start)
            .bind(end_inclusive)
            .fetch_all(self.pool.inner()),
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|(start, n, sum_power)| BucketGroup {
                start,
                count: u64::try_from(n).unwrap_or(0),
                sum_power,
            })
            .collect())
    }

    /// Total number of stored samples.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let row: (i64,) = bounded(
            self.timeout,
            sqlx::query_as("SELECT COUNT(*) FROM readings").fetch_one(self.pool.inner()),
        )
        .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Most recent sample, if any.
    pub async fn latest(&self) -> Result<Option<Sample>, StorageError> {
        let row: Option<(i64, f64, f64, f64)> = bounded(
            self.timeout,
            sqlx::query_as(
                "SELECT ts, voltage, current, power FROM readings ORDER BY ts DESC LIMIT 1",
            )
            .fetch_optional(self.pool.inner()),
        )
        .await?;

        Ok(row.map(|(ts, voltage, current, power)| Sample {
            ts,
            voltage,
            current,
            power,
        }))
    }
}
