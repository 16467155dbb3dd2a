//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing the storage facades.

use std::path::Path;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
use crate::storage::facades::DEFAULT_STORAGE_TIMEOUT;
use crate::storage::schema::init_schema;
use crate::storage::{SampleReader, SampleWriter};

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
    timeout: Duration,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL
    /// (e.g. `sqlite:power.db` or `sqlite::memory:`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    /// Create a builder for a database file path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(format!("sqlite:{}", path.as_ref().display()))
    }

    /// Set the maximum number of pooled connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the bound applied to connection acquisition and every storage call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect, initialize the schema and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        if let Some(path) = file_path_of(&self.url)
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool =
            SqlitePool::connect_with_limit(&self.url, self.max_connections, self.timeout).await?;
        init_schema(&pool).await?;

        tracing::debug!(url = %self.url, max_connections = self.max_connections, "Storage ready");

        Ok(StorageHandles {
            writer: SampleWriter::new(pool.clone(), self.timeout),
            reader: SampleReader::new(pool.clone(), self.timeout),
            pool,
        })
    }
}

/// File path portion of a `sqlite:` URL, if it names a file.
fn file_path_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(path)
    }
}

/// Handles to the storage layer facades.
#[derive(Clone)]
pub struct StorageHandles {
    /// Sample writer (collector only).
    pub writer: SampleWriter,
    /// Sample reader (aggregator, readiness checks).
    pub reader: SampleReader,
    pool: SqlitePool,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles").finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Close the connection pool. Outstanding queries finish first.
    pub async fn shutdown(self) {
        self.pool.close().await;
        tracing::debug!("Storage pool closed");
    }
}
