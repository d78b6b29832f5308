//! Layered configuration loading
//!
//! Sources are merged with figment; later sources override earlier ones.

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Load configuration from a config directory plus environment
///
/// Priority (highest to lowest):
/// 1. Environment variables prefixed with `{NAME}_`
/// 2. Named config file (e.g., `{dir}/redis_kv.yaml`)
/// 3. Default config file (e.g., `{dir}/default.yaml`)
///
/// Missing files are skipped. Fields absent from every source must have
/// serde defaults on `T`.
pub fn load_config<T>(config_dir: impl AsRef<Path>, name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let dir = config_dir.as_ref();
    let env_prefix = format!("{}_", name.to_uppercase());
    debug!(
        "Loading configuration '{}' from {} (env prefix {})",
        name,
        dir.display(),
        env_prefix
    );

    let figment = Figment::new()
        .merge(Toml::file(dir.join("default.toml")))
        .merge(Yaml::file(dir.join("default.yaml")))
        .merge(Json::file(dir.join("default.json")))
        .merge(Toml::file(dir.join(format!("{}.toml", name))))
        .merge(Yaml::file(dir.join(format!("{}.yaml", name))))
        .merge(Json::file(dir.join(format!("{}.json", name))))
        .merge(Env::prefixed(&env_prefix));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    let figment = match extension {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(Error::Config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    };

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}
