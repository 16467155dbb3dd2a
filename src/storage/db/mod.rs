//! Database backend for the telemetry store.
//!
//! SQLite is the only backend. The wrapper keeps sqlx pool setup (journal mode,
//! timeouts, in-memory pinning) in one place so the facades only issue queries.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/power.db?mode=rwc", Duration::from_secs(10)).await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
