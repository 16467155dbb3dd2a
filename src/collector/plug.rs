//! Smart-plug telemetry collector.
//!
//! Polls the device gateway and stores one sample per cycle while the relay
//! reports on. Readings taken while the plug is off are discarded: the load is
//! disconnected and the meter values are stale.

use chrono::Utc;

use crate::collector::{CollectOutcome, Collector, CollectorError};
use crate::gateway::DeviceGateway;
use crate::storage::{Sample, SampleWriter};

/// Collector for a single plug.
pub struct PlugCollector {
    name: String,
    gateway: DeviceGateway,
    writer: SampleWriter,
}

impl PlugCollector {
    /// Create a collector writing through `writer`.
    pub fn new(name: impl Into<String>, gateway: DeviceGateway, writer: SampleWriter) -> Self {
        Self {
            name: name.into(),
            gateway,
            writer,
        }
    }
}

impl std::fmt::Debug for PlugCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlugCollector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for PlugCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self) -> Result<CollectOutcome, CollectorError> {
        let telemetry = self.gateway.read_telemetry().await?;
        if !telemetry.switch_on {
            return Ok(CollectOutcome::SkippedOff);
        }

        let sample = Sample::new(
            Utc::now().timestamp(),
            telemetry.voltage,
            telemetry.current,
            telemetry.power,
        );
        let inserted = self.writer.upsert_sample(&sample).await?;

        Ok(CollectOutcome::Recorded { sample, inserted })
    }
}
