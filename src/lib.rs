//! plugwatch - Smart Plug Energy Monitor
//!
//! Samples voltage, current and power from a cloud-connected smart plug,
//! stores the readings as a per-second SQLite time series and serves bucketed
//! views of that series over HTTP. It can be used as a library, or run as a
//! standalone binary with the `plugwatch` executable.
//!
//! # Architecture
//!
//! - **Gateway**: device access with adaptive switch-code discovery
//! - **Collector**: perpetual 15s sampling loop, sole writer to storage
//! - **Storage**: SQLite (sqlx) sample table with idempotent writes
//! - **Aggregate**: minute/hour/day/week buckets, history and daily summary
//! - **Server**: JSON API (axum)
//!
//! # Example
//!
//! ```rust,no_run
//! use plugwatch::aggregate::{Aggregator, Granularity, WindowOverride};
//! use plugwatch::StorageBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::from_path("power.db").build().await?;
//! let aggregator = Aggregator::new(handles.reader.clone());
//!
//! let day = aggregator.series(Granularity::Day, &WindowOverride::default()).await?;
//! assert_eq!(day.len(), 24);
//!
//! handles.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod gateway;
pub mod server;
pub mod storage;

pub use aggregate::{AggregateError, Aggregator, Bucket, Granularity, WindowOverride};
pub use collector::{Collector, CollectorError, CollectorHandle, PlugCollector};
pub use gateway::{DeviceGateway, GatewayError, SwitchCode, Telemetry};
pub use storage::{Sample, SampleReader, SampleWriter, StorageBuilder, StorageError, StorageHandles};
