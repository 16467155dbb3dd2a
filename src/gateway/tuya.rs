//! Tuya OpenAPI transport.
//!
//! Every request is signed with HMAC-SHA256 over
//! `client_id + access_token + t + METHOD\nsha256(body)\n\npath`, hex encoded
//! upper case. Access tokens are cached until shortly before they expire.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::expand_env_vars;
use crate::gateway::{DeviceTransport, GatewayError, StatusEntry};

/// Default cloud endpoint (EU data center).
pub const DEFAULT_BASE_URL: &str = "https://openapi.tuyaeu.com";

/// Default request timeout (10 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens are refreshed this long before their advertised expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the Tuya cloud transport.
///
/// Credential fields support `${VAR}` / `${VAR:-default}` expansion.
#[derive(Clone, Serialize, Deserialize)]
pub struct TuyaConfig {
    /// API base URL for the project's data center.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Cloud project access id (client id).
    pub access_id: String,
    /// Cloud project access secret.
    pub access_secret: String,
    /// Device id of the plug.
    pub device_id: String,
    /// Request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl std::fmt::Debug for TuyaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuyaConfig")
            .field("base_url", &self.base_url)
            .field("access_id", &self.access_id)
            .field("device_id", &self.device_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TuyaConfig {
    /// Create a configuration for the default endpoint.
    pub fn new(
        access_id: impl Into<String>,
        access_secret: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_id: access_id.into(),
            access_secret: access_secret.into(),
            device_id: device_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Copy with environment variables expanded in every string field.
    pub fn expanded(&self) -> Self {
        Self {
            base_url: expand_env_vars(&self.base_url),
            access_id: expand_env_vars(&self.access_id),
            access_secret: expand_env_vars(&self.access_secret),
            device_id: expand_env_vars(&self.device_id),
            timeout: self.timeout,
        }
    }
}

/// Response envelope shared by all Tuya endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    msg: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, GatewayError> {
        if !self.success {
            return Err(GatewayError::Api {
                code: self
                    .code
                    .map(|c| match c {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "unknown".to_string()),
                msg: self.msg.unwrap_or_default(),
            });
        }
        self.result.ok_or(GatewayError::MissingResult)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    access_token: String,
    /// Lifetime in seconds.
    expire_time: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Compute the request signature.
///
/// `t` is the request time in Unix milliseconds; `token` is empty for the
/// token request itself.
pub fn sign(
    access_id: &str,
    access_secret: &str,
    method: &str,
    path: &str,
    body: &str,
    token: &str,
    t: &str,
) -> Result<String, GatewayError> {
    let body_hash = hex::encode(Sha256::digest(body.as_bytes()));
    let message = format!("{access_id}{token}{t}{method}\n{body_hash}\n\n{path}");

    let mut mac = Hmac::<Sha256>::new_from_slice(access_secret.as_bytes())
        .map_err(|e| GatewayError::Config(format!("invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

/// Signed HTTP client for one Tuya device.
pub struct TuyaClient {
    config: TuyaConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TuyaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuyaClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TuyaClient {
    /// Create a client. Credentials are expanded from the environment.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if the HTTP client cannot be built.
    pub fn new(config: TuyaConfig) -> Result<Self, GatewayError> {
        let config = config.expanded();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    fn status_path(&self) -> String {
        format!("/v1.0/devices/{}/status", self.config.device_id)
    }

    fn commands_path(&self) -> String {
        format!("/v1.0/devices/{}/commands", self.config.device_id)
    }

    /// Return a cached token or fetch a fresh one.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let result: TokenResult = self.request(Method::GET, TOKEN_PATH, None, "").await?;
        let lifetime = Duration::from_secs(result.expire_time).saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Obtained device API token");

        *cached = Some(CachedToken {
            value: result.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(result.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send one signed request and unwrap the envelope.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        token: &str,
    ) -> Result<T, GatewayError> {
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let body_text = body.as_deref().unwrap_or("");
        let signature = sign(
            &self.config.access_id,
            &self.config.access_secret,
            method.as_str(),
            path,
            body_text,
            token,
            &t,
        )?;

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .request(method, url)
            .header("client_id", self.config.access_id.as_str())
            .header("sign", signature)
            .header("t", t)
            .header("sign_method", "HMAC-SHA256");
        if !token.is_empty() {
            request = request.header("access_token", token);
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let envelope: Envelope<T> = request.send().await?.json().await?;
        envelope.into_result()
    }

    /// Run an authenticated call, dropping the cached token on API errors.
    async fn authenticated<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<T, GatewayError> {
        let token = self.access_token().await?;
        let result = self.request(method, path, body, &token).await;
        if let Err(GatewayError::Api { .. }) = &result {
            self.invalidate_token().await;
        }
        result
    }
}

#[async_trait::async_trait]
impl DeviceTransport for TuyaClient {
    async fn fetch_status(&self) -> Result<Vec<StatusEntry>, GatewayError> {
        let raw: Vec<serde_json::Value> = self
            .authenticated(Method::GET, &self.status_path(), None)
            .await?;

        // Entries that are not `{code, value}` objects are skipped.
        Ok(raw
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<StatusEntry>(entry).ok())
            .collect())
    }

    async fn send_command(&self, code: &str, value: bool) -> Result<(), GatewayError> {
        let body = serde_json::json!({ "commands": [{ "code": code, "value": value }] }).to_string();
        let _: serde_json::Value = self
            .authenticated(Method::POST, &self.commands_path(), Some(body))
            .await?;
        Ok(())
    }
}
