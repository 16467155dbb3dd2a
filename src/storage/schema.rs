//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// SQL statement for creating the readings table.
///
/// `ts` (Unix seconds) is the natural key; the primary key constraint is what
/// turns duplicate collector ticks into no-ops.
pub const READINGS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    ts      INTEGER PRIMARY KEY,
    voltage REAL NOT NULL,
    current REAL NOT NULL,
    power   REAL NOT NULL
);
"#;

/// Index supporting the `power > threshold` runtime count.
pub const READINGS_POWER_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_readings_ts_power ON readings (ts, power);
"#;

/// Initialize the database schema.
///
/// Creates the readings table and its index if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(READINGS_TABLE_DDL)
        .execute(pool.inner())
        .await?;
    sqlx::query(READINGS_POWER_INDEX_DDL)
        .execute(pool.inner())
        .await?;
    tracing::debug!("Schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:", Duration::from_secs(5))
            .await
            .unwrap();

        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'readings'",
        )
        .fetch_one(pool.inner())
        .await
        .unwrap();
        assert_eq!(count.0, 1);
    }
}
