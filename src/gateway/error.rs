//! Gateway error types.

use std::time::Duration;

use thiserror::Error;

/// Errors talking to the remote device.
///
/// Every variant means the device is unavailable for this call; callers never
/// assume a command took effect when one is returned.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (DNS, TLS, connection reset, bad JSON body).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete within its bound.
    #[error("device call timed out after {0:?}")]
    Timeout(Duration),

    /// The cloud API answered with `success: false`.
    #[error("device api error {code}: {msg}")]
    Api { code: String, msg: String },

    /// The cloud API answered `success: true` without a `result` field.
    #[error("device response missing 'result'")]
    MissingResult,

    /// The response body could not be interpreted.
    #[error("malformed device response: {0}")]
    Decode(String),

    /// Client could not be constructed from its configuration.
    #[error("gateway config error: {0}")]
    Config(String),
}
