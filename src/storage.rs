//! Storage Layer
//!
//! Append-only SQLite time series of telemetry samples.
//!
//! # Components
//!
//! - [`SampleWriter`]: idempotent per-second inserts (collector only)
//! - [`SampleReader`]: range reads, bucket grouping and daily aggregates
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle management

mod builder;
pub mod db;
mod error;
mod facades;
mod schema;
mod types;

pub use builder::{StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{DEFAULT_STORAGE_TIMEOUT, SampleReader, SampleWriter};
pub use types::{BucketGroup, Sample};
