//! Device Gateway
//!
//! Capability boundary to the remote smart plug.
//!
//! - [`DeviceTransport`]: raw status/command calls (one implementation per cloud API)
//! - [`DeviceGateway`]: telemetry decoding, bounded timeouts and switch dp-code adaptation
//! - [`TuyaClient`]: signed Tuya OpenAPI transport
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugwatch::gateway::{DeviceGateway, TuyaClient, TuyaConfig};
//!
//! # async fn run() -> Result<(), plugwatch::GatewayError> {
//! let client = TuyaClient::new(TuyaConfig::new("${TUYA_ACCESS_ID}", "${TUYA_ACCESS_SECRET}", "dev-id"))?;
//! let gateway = DeviceGateway::new(Arc::new(client));
//! let telemetry = gateway.read_telemetry().await?;
//! println!("{} W", telemetry.power);
//! # Ok(())
//! # }
//! ```

mod device;
mod error;
pub mod tuya;

use serde::{Deserialize, Serialize};

pub use device::{DEFAULT_GATEWAY_TIMEOUT, DeviceGateway, SwitchCode, SwitchOutcome, Telemetry};
pub use error::GatewayError;
pub use tuya::{TuyaClient, TuyaConfig};

/// One `{code, value}` entry of a device status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Raw access to a device.
///
/// Implementations handle authentication and transport only; they neither
/// retry nor interpret the status listing.
#[async_trait::async_trait]
pub trait DeviceTransport: Send + Sync + 'static {
    /// Fetch the device's current status listing.
    async fn fetch_status(&self) -> Result<Vec<StatusEntry>, GatewayError>;

    /// Send a boolean command under the given capability code.
    async fn send_command(&self, code: &str, value: bool) -> Result<(), GatewayError>;
}
