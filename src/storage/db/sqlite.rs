//! SQLite backend implementation using sqlx.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::storage::StorageError;

/// Default maximum connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite connection pool wrapper.
///
/// Wraps sqlx's SqlitePool with WAL mode so readers never observe a partially
/// written row while the collector inserts.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Connect with the default connection limit.
    pub async fn connect(url: &str, acquire_timeout: Duration) -> Result<Self, StorageError> {
        Self::connect_with_limit(url, DEFAULT_MAX_CONNECTIONS, acquire_timeout).await
    }

    /// Connect to a SQLite database.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g., `sqlite:data/power.db`
    /// * `max_connections` - upper bound on pooled connections
    /// * `acquire_timeout` - how long a caller may wait for a free connection
    ///
    /// In-memory databases are private to one connection, so they are pinned
    /// to a single connection that is never recycled.
    pub async fn connect_with_limit(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(acquire_timeout)
            .create_if_missing(true);

        let pool_options = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        Ok(Self { inner: pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_sqlite_pool_connect() {
        let pool = SqlitePool::connect("sqlite::memory:", TIMEOUT).await.unwrap();
        assert!(!pool.is_closed());

        let row: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, 1);

        pool.close().await;
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_memory_pool_shares_one_database() {
        let pool = SqlitePool::connect_with_limit("sqlite::memory:", 8, TIMEOUT)
            .await
            .unwrap();

        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(pool.inner())
            .await
            .unwrap();
        sqlx::query("INSERT INTO t VALUES (7)")
            .execute(pool.inner())
            .await
            .unwrap();

        // A second acquire must see the same in-memory table.
        let row: (i64,) = sqlx::query_as("SELECT x FROM t")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, 7);
    }

    #[tokio::test]
    async fn test_sqlite_pool_wal_mode_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("wal.db").display());
        let pool = SqlitePool::connect(&url, TIMEOUT).await.unwrap();

        let row: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(row.0, "wal");

        pool.close().await;
    }
}
