//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::TuyaConfig;
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;
use crate::storage::{DEFAULT_STORAGE_TIMEOUT, StorageBuilder};

use super::validation::{
    ConfigError, require_non_empty, require_positive, validate_bind_address, validate_http_url,
};

// =============================================================================
// Constants
// =============================================================================

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "power.db";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_storage_timeout() -> Duration {
    DEFAULT_STORAGE_TIMEOUT
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:` (default: "power.db").
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Connection pool size (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Bound on every storage call (default: 10s).
    #[serde(default = "default_storage_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// Storage builder for this configuration.
    pub fn storage_builder(&self) -> StorageBuilder {
        let builder = if self.path == ":memory:" {
            StorageBuilder::new("sqlite::memory:")
        } else {
            StorageBuilder::from_path(&self.path)
        };
        builder
            .max_connections(self.max_connections)
            .timeout(self.timeout)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Smart plug cloud access.
    pub device: TuyaConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Device fields are checked after `${VAR}` expansion.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bind_address(&self.server.bind)?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        require_non_empty("database path", &self.database.path)?;
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }
        require_positive("database timeout", self.database.timeout)?;

        let device = self.device.expanded();
        validate_http_url("device base_url", &device.base_url)?;
        require_non_empty("device access_id", &device.access_id)?;
        require_non_empty("device access_secret", &device.access_secret)?;
        require_non_empty("device device_id", &device.device_id)?;
        require_positive("device timeout", device.timeout)?;

        Ok(())
    }
}
