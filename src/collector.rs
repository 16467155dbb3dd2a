//! Collector Layer
//!
//! Periodic telemetry sampling. Each collector runs in its own Tokio task and
//! writes through the storage writer facade.
//!
//! # Architecture
//!
//! - [`Collector`]: one poll-and-store cycle
//! - [`PlugCollector`]: smart-plug implementation backed by the device gateway
//! - [`CollectorHandle`]: perpetual loop with counters and graceful shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugwatch::collector::{CollectorHandle, PlugCollector, SAMPLING_INTERVAL};
//! use plugwatch::gateway::{DeviceGateway, TuyaClient, TuyaConfig};
//! use plugwatch::StorageBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::from_path("power.db").build().await?;
//! let client = TuyaClient::new(TuyaConfig::new("id", "secret", "device"))?;
//! let collector = PlugCollector::new(
//!     "plug",
//!     DeviceGateway::new(Arc::new(client)),
//!     handles.writer.clone(),
//! );
//! let handle = CollectorHandle::spawn(collector, SAMPLING_INTERVAL);
//! // ...
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod plug;
mod runner;
mod traits;

pub use plug::PlugCollector;
pub use runner::{CollectorHandle, CollectorStats, CollectorStatsSnapshot, DEFAULT_SHUTDOWN_TIMEOUT};
pub use traits::{CollectOutcome, Collector, CollectorError, MIN_INTERVAL, SAMPLING_INTERVAL};
