//! Device gateway with adaptive switch dp-code discovery.
//!
//! Plugs expose their relay under either `switch_1` or `switch`. The gateway
//! starts with `switch_1` and adopts the other code when a status read only
//! carries the alternate, or when a command succeeds only with it.
//!
//! The remembered code sits behind a plain mutex that is never held across an
//! await, so telemetry reads stay within their timeout while a command is in
//! flight. Switch commands are serialized by a separate async lock that reads
//! never take.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::gateway::{DeviceTransport, GatewayError, StatusEntry};

/// Default bound on a single device call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Status code carrying voltage in tenths of a volt.
const VOLTAGE_CODE: &str = "cur_voltage";
/// Status code carrying current in milliamps.
const CURRENT_CODE: &str = "cur_current";
/// Status code carrying power in tenths of a watt.
const POWER_CODE: &str = "cur_power";

/// Identifier of the device's power-switch capability.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwitchCode {
    /// Multi-outlet style code, tried first.
    #[default]
    #[strum(to_string = "switch_1")]
    #[serde(rename = "switch_1")]
    Switch1,
    /// Single-relay style code.
    Switch,
}

impl SwitchCode {
    /// The other known code.
    pub fn alternate(self) -> Self {
        match self {
            Self::Switch1 => Self::Switch,
            Self::Switch => Self::Switch1,
        }
    }
}

/// One decoded telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Telemetry {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub switch_on: bool,
}

impl Telemetry {
    /// Decode a status listing using `switch_code` for the relay state.
    ///
    /// Missing or null measurements read as 0; a missing switch reads as off.
    /// A numeric switch value counts as on when non-zero.
    pub fn from_status(codes: &HashMap<&str, &serde_json::Value>, switch_code: SwitchCode) -> Self {
        let scaled = |code: &str, divisor: f64| {
            codes
                .get(code)
                .and_then(|v| v.as_f64())
                .filter(|v| v.is_finite() && *v > 0.0)
                .map_or(0.0, |v| v / divisor)
        };

        Self {
            voltage: scaled(VOLTAGE_CODE, 10.0),
            current: scaled(CURRENT_CODE, 1000.0),
            power: scaled(POWER_CODE, 10.0),
            switch_on: codes
                .get(switch_code.as_ref())
                .is_some_and(|v| is_truthy(v)),
        }
    }
}

/// Booleans as-is, numbers when non-zero. Anything else reads as off.
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

/// Result of a successful switch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    /// Code the command was accepted under.
    pub code_used: SwitchCode,
}

/// Device gateway: telemetry reads and switch commands over a transport.
#[derive(Clone)]
pub struct DeviceGateway {
    transport: Arc<dyn DeviceTransport>,
    switch_code: Arc<StdMutex<SwitchCode>>,
    command_lock: Arc<Mutex<()>>,
    timeout: Duration,
}

impl std::fmt::Debug for DeviceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceGateway {
    /// Create a gateway assuming the default switch code.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            switch_code: Arc::new(StdMutex::new(SwitchCode::default())),
            command_lock: Arc::new(Mutex::new(())),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Set the bound applied to each device call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The switch code currently assumed.
    pub fn switch_code(&self) -> SwitchCode {
        *self.code_slot()
    }

    fn code_slot(&self) -> MutexGuard<'_, SwitchCode> {
        // A two-valued code cannot be left half-written.
        self.switch_code
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the current telemetry.
    ///
    /// If the status listing lacks the remembered switch code but carries the
    /// alternate, the alternate is adopted for this and all later calls.
    pub async fn read_telemetry(&self) -> Result<Telemetry, GatewayError> {
        let status = timeout(self.timeout, self.transport.fetch_status())
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;

        let codes: HashMap<&str, &serde_json::Value> = status
            .iter()
            .map(|StatusEntry { code, value }| (code.as_str(), value))
            .collect();

        let code = {
            let mut current = self.code_slot();
            let (assumed, alternate) = (*current, current.alternate());
            if !codes.contains_key(assumed.as_ref()) && codes.contains_key(alternate.as_ref()) {
                tracing::info!(from = %assumed, to = %alternate, "Adopting switch code from status");
                *current = alternate;
            }
            *current
        };

        Ok(Telemetry::from_status(&codes, code))
    }

    /// Switch the relay on or off.
    ///
    /// Tries the remembered code, then exactly once the alternate. A success
    /// with the alternate makes it the remembered code. When both attempts
    /// fail the second error is returned. Concurrent commands run one at a
    /// time; telemetry reads are not blocked by them.
    pub async fn set_switch(&self, on: bool) -> Result<SwitchOutcome, GatewayError> {
        let _command = self.command_lock.lock().await;
        let assumed = self.switch_code();

        let first = match self.send(assumed, on).await {
            Ok(()) => {
                tracing::info!(code = %assumed, on, "Switch command accepted");
                return Ok(SwitchOutcome { code_used: assumed });
            }
            Err(e) => e,
        };

        let alternate = assumed.alternate();
        tracing::warn!(
            code = %assumed,
            fallback = %alternate,
            error = %first,
            "Switch command failed, retrying with alternate code"
        );

        match self.send(alternate, on).await {
            Ok(()) => {
                *self.code_slot() = alternate;
                tracing::info!(code = %alternate, on, "Switch command accepted, code adopted");
                Ok(SwitchOutcome {
                    code_used: alternate,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, on, "Switch command failed with both codes");
                Err(e)
            }
        }
    }

    async fn send(&self, code: SwitchCode, on: bool) -> Result<(), GatewayError> {
        timeout(self.timeout, self.transport.send_command(code.as_ref(), on))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport that replays a fixed status and accepts only listed codes.
    struct FakePlug {
        status: Vec<StatusEntry>,
        accepted_codes: Vec<&'static str>,
        commands: StdMutex<Vec<(String, bool)>>,
    }

    impl FakePlug {
        fn new(status: serde_json::Value, accepted_codes: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                status: serde_json::from_value(status).unwrap(),
                accepted_codes,
                commands: StdMutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<(String, bool)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DeviceTransport for FakePlug {
        async fn fetch_status(&self) -> Result<Vec<StatusEntry>, GatewayError> {
            Ok(self.status.clone())
        }

        async fn send_command(&self, code: &str, value: bool) -> Result<(), GatewayError> {
            self.commands.lock().unwrap().push((code.to_string(), value));
            if self.accepted_codes.contains(&code) {
                Ok(())
            } else {
                Err(GatewayError::Api {
                    code: "2008".to_string(),
                    msg: format!("command or value not support: {code}"),
                })
            }
        }
    }

    /// Transport that never answers.
    struct Stalled;

    #[async_trait::async_trait]
    impl DeviceTransport for Stalled {
        async fn fetch_status(&self) -> Result<Vec<StatusEntry>, GatewayError> {
            std::future::pending().await
        }

        async fn send_command(&self, _code: &str, _value: bool) -> Result<(), GatewayError> {
            std::future::pending().await
        }
    }

    /// Transport whose commands are slow and always rejected.
    struct SlowRejectingPlug {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowRejectingPlug {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl DeviceTransport for SlowRejectingPlug {
        async fn fetch_status(&self) -> Result<Vec<StatusEntry>, GatewayError> {
            Ok(serde_json::from_value(json!([
                {"code": "switch_1", "value": true},
                {"code": "cur_power", "value": 1000}
            ]))
            .unwrap())
        }

        async fn send_command(&self, code: &str, _value: bool) -> Result<(), GatewayError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Err(GatewayError::Api {
                code: "1010".to_string(),
                msg: format!("device offline: {code}"),
            })
        }
    }

    #[test]
    fn test_switch_code_strings() {
        assert_eq!(SwitchCode::Switch1.as_ref(), "switch_1");
        assert_eq!(SwitchCode::Switch.as_ref(), "switch");
        assert_eq!(SwitchCode::from_str("switch_1").unwrap(), SwitchCode::Switch1);
        assert_eq!(SwitchCode::Switch1.alternate(), SwitchCode::Switch);
        assert_eq!(SwitchCode::Switch.alternate(), SwitchCode::Switch1);
        assert_eq!(
            serde_json::to_value(SwitchCode::Switch1).unwrap(),
            json!("switch_1")
        );
    }

    #[tokio::test]
    async fn test_read_telemetry_scales_values() {
        let plug = FakePlug::new(
            json!([
                {"code": "switch_1", "value": true},
                {"code": "cur_voltage", "value": 2301},
                {"code": "cur_current", "value": 452},
                {"code": "cur_power", "value": 1034}
            ]),
            vec![],
        );
        let gateway = DeviceGateway::new(plug);

        let t = gateway.read_telemetry().await.unwrap();
        assert!(t.switch_on);
        assert!((t.voltage - 230.1).abs() < 1e-9);
        assert!((t.current - 0.452).abs() < 1e-9);
        assert!((t.power - 103.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_read_telemetry_missing_values_are_zero() {
        let plug = FakePlug::new(
            json!([{"code": "switch_1", "value": false}, {"code": "cur_power", "value": null}]),
            vec![],
        );
        let t = DeviceGateway::new(plug).read_telemetry().await.unwrap();
        assert_eq!(
            t,
            Telemetry {
                voltage: 0.0,
                current: 0.0,
                power: 0.0,
                switch_on: false
            }
        );
    }

    #[tokio::test]
    async fn test_numeric_switch_values() {
        for (value, expected) in [(json!(1), true), (json!(0), false), (json!("on"), false)] {
            let plug = FakePlug::new(json!([{"code": "switch_1", "value": value}]), vec![]);
            let t = DeviceGateway::new(plug).read_telemetry().await.unwrap();
            assert_eq!(t.switch_on, expected, "{value}");
        }
    }

    #[tokio::test]
    async fn test_read_telemetry_adopts_alternate_code() {
        let plug = FakePlug::new(
            json!([{"code": "switch", "value": true}, {"code": "cur_power", "value": 500}]),
            vec![],
        );
        let gateway = DeviceGateway::new(plug);
        assert_eq!(gateway.switch_code(), SwitchCode::Switch1);

        let t = gateway.read_telemetry().await.unwrap();
        assert!(t.switch_on);
        assert_eq!(gateway.switch_code(), SwitchCode::Switch);
    }

    #[tokio::test]
    async fn test_read_telemetry_keeps_code_when_neither_present() {
        let plug = FakePlug::new(json!([{"code": "cur_power", "value": 500}]), vec![]);
        let gateway = DeviceGateway::new(plug);

        let t = gateway.read_telemetry().await.unwrap();
        assert!(!t.switch_on);
        assert_eq!(gateway.switch_code(), SwitchCode::Switch1);
    }

    #[tokio::test]
    async fn test_set_switch_uses_remembered_code() {
        let plug = FakePlug::new(json!([]), vec!["switch_1"]);
        let gateway = DeviceGateway::new(plug.clone());

        let outcome = gateway.set_switch(true).await.unwrap();
        assert_eq!(outcome.code_used, SwitchCode::Switch1);
        assert_eq!(plug.commands(), vec![("switch_1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_set_switch_falls_back_once_and_adopts() {
        let plug = FakePlug::new(json!([]), vec!["switch"]);
        let gateway = DeviceGateway::new(plug.clone());

        let outcome = gateway.set_switch(true).await.unwrap();
        assert_eq!(outcome.code_used, SwitchCode::Switch);
        assert_eq!(
            plug.commands(),
            vec![("switch_1".to_string(), true), ("switch".to_string(), true)]
        );

        // The adopted code is tried first next time; no retry of the original.
        let outcome = gateway.set_switch(false).await.unwrap();
        assert_eq!(outcome.code_used, SwitchCode::Switch);
        assert_eq!(plug.commands().len(), 3);
        assert_eq!(plug.commands()[2], ("switch".to_string(), false));
    }

    #[tokio::test]
    async fn test_set_switch_fails_after_single_retry() {
        let plug = FakePlug::new(json!([]), vec![]);
        let gateway = DeviceGateway::new(plug.clone());

        let err = gateway.set_switch(true).await.unwrap_err();
        assert!(err.to_string().contains("switch"));
        assert_eq!(plug.commands().len(), 2);
        assert_eq!(gateway.switch_code(), SwitchCode::Switch1);
    }

    #[tokio::test]
    async fn test_calls_are_bounded_by_timeout() {
        let gateway =
            DeviceGateway::new(Arc::new(Stalled)).with_timeout(Duration::from_millis(20));

        assert!(matches!(
            gateway.read_telemetry().await,
            Err(GatewayError::Timeout(_))
        ));
        assert!(matches!(
            gateway.set_switch(true).await,
            Err(GatewayError::Timeout(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_not_blocked_by_inflight_switch() {
        let plug = SlowRejectingPlug::new(Duration::from_millis(900));
        let gateway = DeviceGateway::new(plug).with_timeout(Duration::from_secs(1));

        let switching = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.set_switch(true).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = tokio::time::Instant::now();
        let t = gateway.read_telemetry().await.unwrap();
        assert!(t.switch_on);
        assert!(started.elapsed() < Duration::from_millis(100));

        // Both attempts were rejected; the remembered code is unchanged.
        assert!(switching.await.unwrap().is_err());
        assert_eq!(gateway.switch_code(), SwitchCode::Switch1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_commands_are_serialized() {
        let plug = SlowRejectingPlug::new(Duration::from_millis(200));
        let gateway = DeviceGateway::new(plug.clone());

        let (a, b) = tokio::join!(gateway.set_switch(true), gateway.set_switch(false));
        assert!(a.is_err() && b.is_err());
        assert_eq!(plug.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
