//! Adapter configuration
//!
//! [`AdapterOptions`] is what callers (or config files) provide; every field
//! is optional. [`AdapterConfig::merge`] applies the documented defaults and
//! produces the immutable configuration the adapter runs with.

use crate::codec::Serialization;
use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name used for config files (`redis_kv.yaml`) and the env prefix (`REDIS_KV_`)
pub const CONFIG_NAME: &str = "redis_kv";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES_PER_REQUEST: u32 = 3;

/// User-supplied adapter options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// `redis://` or `rediss://` URL; wins over host/port
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database index
    pub db: Option<i64>,
    /// Namespace prepended to every key; also scopes `clear()`
    pub key_prefix: Option<String>,
    /// Fallback TTL in milliseconds when an operation omits one (0 = none)
    pub default_ttl_ms: Option<u64>,
    pub connection_timeout_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
    pub max_retries_per_request: Option<u32>,
    pub enable_ready_check: Option<bool>,
    pub serialization: Option<Serialization>,
}

/// Where the client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Url(String),
    HostPort { host: String, port: u16 },
}

/// Effective adapter configuration, immutable after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
    pub key_prefix: String,
    /// Zero means no default expiration
    pub default_ttl: Duration,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
    pub max_retries_per_request: u32,
    pub enable_ready_check: bool,
    pub serialization: Serialization,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::merge(AdapterOptions::default())
    }
}

impl AdapterConfig {
    /// Apply defaults to user options
    pub fn merge(options: AdapterOptions) -> Self {
        Self {
            url: options.url,
            host: options.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: options.port.unwrap_or(DEFAULT_PORT),
            username: options.username,
            password: options.password,
            db: options.db.unwrap_or(0),
            key_prefix: options.key_prefix.unwrap_or_default(),
            default_ttl: Duration::from_millis(options.default_ttl_ms.unwrap_or(0)),
            connection_timeout: options
                .connection_timeout_ms
                .map_or(DEFAULT_CONNECTION_TIMEOUT, Duration::from_millis),
            command_timeout: options
                .command_timeout_ms
                .map_or(DEFAULT_COMMAND_TIMEOUT, Duration::from_millis),
            max_retries_per_request: options
                .max_retries_per_request
                .unwrap_or(DEFAULT_MAX_RETRIES_PER_REQUEST),
            enable_ready_check: options.enable_ready_check.unwrap_or(true),
            serialization: options.serialization.unwrap_or_default(),
        }
    }

    /// Load options from `{dir}/default.*`, `{dir}/redis_kv.*` and `REDIS_KV_*`
    /// environment variables, then merge and validate
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self> {
        let options: AdapterOptions = common::config::load_config(config_dir, CONFIG_NAME)?;
        let config = Self::merge(options);
        config.validate()?;
        Ok(config)
    }

    /// Load options from a single toml/yaml/json file, then merge and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let options: AdapterOptions = common::config::load_config_from_file(path)?;
        let config = Self::merge(options);
        config.validate()?;
        Ok(config)
    }

    /// Effective connection target. A URL wins over host/port.
    pub fn target(&self) -> ConnectionTarget {
        match &self.url {
            Some(url) => ConnectionTarget::Url(url.clone()),
            None => ConnectionTarget::HostPort {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_none() && self.host.trim().is_empty() {
            return Err(AdapterError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(AdapterError::Config("port must be non-zero".to_string()));
        }
        if self.db < 0 {
            return Err(AdapterError::Config(format!(
                "db must be non-negative, got {}",
                self.db
            )));
        }
        if self.connection_timeout.is_zero() {
            return Err(AdapterError::Config(
                "connection timeout must be non-zero".to_string(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(AdapterError::Config(
                "command timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// TTL applied when an operation passes `ttl`; `None` falls back to the default.
    /// A zero result means no expiration.
    pub fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_merge_defaults() {
        let config = AdapterConfig::merge(AdapterOptions::default());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
        assert_eq!(config.db, 0);
        assert_eq!(config.key_prefix, "");
        assert_eq!(config.default_ttl, Duration::ZERO);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries_per_request, 3);
        assert!(config.enable_ready_check);
        assert_eq!(config.serialization, Serialization::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_overrides() {
        let config = AdapterConfig::merge(AdapterOptions {
            key_prefix: Some("t:".to_string()),
            default_ttl_ms: Some(1500),
            command_timeout_ms: Some(250),
            enable_ready_check: Some(false),
            serialization: Some(Serialization::Plain),
            ..Default::default()
        });
        assert_eq!(config.key_prefix, "t:");
        assert_eq!(config.default_ttl, Duration::from_millis(1500));
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert!(!config.enable_ready_check);
        assert_eq!(config.serialization, Serialization::Plain);
    }

    #[test]
    fn test_target_precedence() {
        let config = AdapterConfig::merge(AdapterOptions {
            host: Some("db.internal".to_string()),
            port: Some(6380),
            ..Default::default()
        });
        assert_eq!(
            config.target(),
            ConnectionTarget::HostPort {
                host: "db.internal".to_string(),
                port: 6380
            }
        );

        let config = AdapterConfig::merge(AdapterOptions {
            url: Some("redis://cache:6379/1".to_string()),
            host: Some("db.internal".to_string()),
            ..Default::default()
        });
        assert_eq!(
            config.target(),
            ConnectionTarget::Url("redis://cache:6379/1".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            AdapterOptions {
                port: Some(0),
                ..Default::default()
            },
            AdapterOptions {
                db: Some(-1),
                ..Default::default()
            },
            AdapterOptions {
                connection_timeout_ms: Some(0),
                ..Default::default()
            },
            AdapterOptions {
                command_timeout_ms: Some(0),
                ..Default::default()
            },
        ];

        for options in cases {
            let err = AdapterConfig::merge(options).validate().unwrap_err();
            assert!(matches!(err, AdapterError::Config(_)));
        }
    }

    #[test]
    fn test_effective_ttl() {
        let config = AdapterConfig::merge(AdapterOptions {
            default_ttl_ms: Some(2000),
            ..Default::default()
        });
        assert_eq!(config.effective_ttl(None), Duration::from_secs(2));
        assert_eq!(
            config.effective_ttl(Some(Duration::from_millis(10))),
            Duration::from_millis(10)
        );
        // Explicit zero disables the default
        assert_eq!(config.effective_ttl(Some(Duration::ZERO)), Duration::ZERO);
    }

    #[test]
    fn test_from_file_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("adapter.yaml");
        fs::write(
            &path,
            r#"
host: "redis.local"
port: 6390
key_prefix: "app:"
default_ttl_ms: 60000
serialization: plain
"#,
        )
        .unwrap();

        let config = AdapterConfig::from_file(&path).unwrap();
        assert_eq!(config.host, "redis.local");
        assert_eq!(config.port, 6390);
        assert_eq!(config.key_prefix, "app:");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.serialization, Serialization::Plain);
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_from_file_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("adapter.toml");
        fs::write(&path, "port = 0\n").unwrap();

        let err = AdapterConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_load_with_env_override() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("redis_kv.toml"),
            "host = \"from-file\"\nport = 6390\n",
        )
        .unwrap();

        std::env::set_var("REDIS_KV_PORT", "6400");
        let result = AdapterConfig::load(temp_dir.path());
        std::env::remove_var("REDIS_KV_PORT");

        let config = result.unwrap();
        assert_eq!(config.host, "from-file");
        assert_eq!(config.port, 6400);
    }
}
