//! Configuration module for plugwatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (path, pool size, operation timeout)
//! - Device settings (cloud endpoint, credentials, device id)

mod app;
mod validation;

pub use app::{AppConfig, DEFAULT_DB_PATH, DatabaseConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars};
