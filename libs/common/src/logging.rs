//! Logging setup for processes that embed the adapter
//!
//! Library code only emits `tracing` events. This module decides where they
//! go: an optional console sink and an optional log file written through a
//! non-blocking appender. [`LogConfig`] is plain serde, so it can sit in the
//! same config directory as the adapter settings (`logging.*`, `LOGGING_*`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Config name used by [`LogConfig::load`]
pub const LOGGING_CONFIG_NAME: &str = "logging";

/// Fallback file name when `file` points at a directory-like path
const DEFAULT_LOG_FILE: &str = "redis-kv.log";

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info,redis_kv=debug`
    pub level: String,
    pub format: LogFormat,
    pub console: bool,
    pub file: Option<PathBuf>,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// When the log file rolls over; `Never` writes to `file` as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            console: true,
            file: None,
            rotation: LogRotation::Daily,
        }
    }
}

impl LogConfig {
    /// Load from `{dir}/default.*`, `{dir}/logging.*` and `LOGGING_*`
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self> {
        crate::config::load_config(config_dir, LOGGING_CONFIG_NAME)
    }
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", level, e)))
}

fn file_writer(path: &Path, rotation: LogRotation) -> Result<(NonBlocking, WorkerGuard)> {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_FILE), PathBuf::from);
    std::fs::create_dir_all(directory)?;

    let appender = match rotation {
        LogRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
        LogRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
        LogRotation::Never => tracing_appender::rolling::never(directory, file_name),
    };
    Ok(tracing_appender::non_blocking(appender))
}

/// Build the sinks `config` asks for without installing them
///
/// The guard flushes the file sink when dropped and must outlive logging.
pub fn build_layers(config: &LogConfig) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>)> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console {
        let console = match config.format {
            LogFormat::Json => fmt::layer().json().boxed(),
            LogFormat::Pretty => fmt::layer().pretty().boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        };
        layers.push(console.with_filter(env_filter(&config.level)?).boxed());
    }

    if let Some(path) = &config.file {
        let (writer, file_guard) = file_writer(path, config.rotation)?;
        guard = Some(file_guard);

        let file = match config.format {
            LogFormat::Json => fmt::layer().json().with_writer(writer).with_ansi(false).boxed(),
            LogFormat::Pretty | LogFormat::Compact => {
                fmt::layer().with_writer(writer).with_ansi(false).boxed()
            },
        };
        layers.push(file.with_filter(env_filter(&config.level)?).boxed());
    }

    Ok((layers, guard))
}

/// Install the configured sinks as the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (layers, guard) = build_layers(config)?;
    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))?;
    Ok(guard)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn file_config(path: PathBuf, format: LogFormat) -> LogConfig {
        LogConfig {
            level: "info".to_string(),
            format,
            console: false,
            file: Some(path),
            rotation: LogRotation::Never,
        }
    }

    fn emit_with(layers: Vec<BoxedLayer>, emit: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(layers);
        tracing::subscriber::with_default(subscriber, emit);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console);
        assert!(config.file.is_none());
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LogConfig {
            level: "redis_kv=loud".to_string(),
            ..Default::default()
        };
        let err = build_layers(&config).err().expect("expected error");
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_file_sink_honours_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("kv.log");
        let config = file_config(path.clone(), LogFormat::Compact);
        let (layers, guard) = build_layers(&config).unwrap();

        emit_with(layers, || {
            tracing::info!(host = "memory", "RedisKvAdapter ready");
            tracing::debug!("RedisKvAdapter reconnecting");
        });
        drop(guard);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("RedisKvAdapter ready"));
        assert!(written.contains("memory"));
        assert!(!written.contains("reconnecting"));
    }

    #[test]
    fn test_json_file_sink() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv.json.log");
        let config = file_config(path.clone(), LogFormat::Json);
        let (layers, guard) = build_layers(&config).unwrap();

        emit_with(layers, || tracing::warn!(db = 0, "flushed the whole database"));
        drop(guard);

        let written = std::fs::read_to_string(&path).unwrap();
        let first = written.lines().next().unwrap();
        let line: serde_json::Value = serde_json::from_str(first).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "flushed the whole database");
        assert_eq!(line["fields"]["db"], 0);
    }

    #[test]
    #[serial]
    fn test_load_from_config_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("logging.yaml"),
            "format: json\nconsole: false\nfile: /var/log/kv.log\nrotation: hourly\n",
        )
        .unwrap();

        std::env::set_var("LOGGING_LEVEL", "redis_kv=debug");
        let loaded = LogConfig::load(dir.path());
        std::env::remove_var("LOGGING_LEVEL");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.level, "redis_kv=debug");
        assert_eq!(loaded.format, LogFormat::Json);
        assert!(!loaded.console);
        assert_eq!(loaded.file, Some(PathBuf::from("/var/log/kv.log")));
        assert_eq!(loaded.rotation, LogRotation::Hourly);
    }
}
