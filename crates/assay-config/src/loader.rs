//! Configuration loading
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, `ASSAY_*`
//! environment variables.

use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::components::{BlobBackend, LogFormat, StorageBackend};
use crate::config::AssayConfig;
use crate::error::{ConfigError, ConfigResult};

pub const ENV_STORAGE_BACKEND: &str = "ASSAY_STORAGE_BACKEND";
pub const ENV_SQLITE_PATH: &str = "ASSAY_SQLITE_PATH";
pub const ENV_WORKERS: &str = "ASSAY_WORKERS";
pub const ENV_MAX_ATTEMPTS: &str = "ASSAY_MAX_ATTEMPTS";
pub const ENV_REAPER_ENABLED: &str = "ASSAY_REAPER_ENABLED";
pub const ENV_BLOB_ROOT: &str = "ASSAY_BLOB_ROOT";
pub const ENV_LOG_LEVEL: &str = "ASSAY_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "ASSAY_LOG_FORMAT";

impl AssayConfig {
    /// Load from an optional TOML file, apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `ASSAY_*` overrides read through `lookup`
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_STORAGE_BACKEND) {
            self.storage.backend = match value.trim().to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "sqlite" => StorageBackend::Sqlite,
                _ => {
                    return Err(invalid_env(
                        ENV_STORAGE_BACKEND,
                        value,
                        "expected memory or sqlite",
                    ))
                }
            };
        }
        if let Some(value) = lookup(ENV_SQLITE_PATH) {
            self.storage.sqlite_path = value.into();
        }
        if let Some(value) = lookup(ENV_WORKERS) {
            self.consumer.workers = parse_env(ENV_WORKERS, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.consumer.max_attempts = parse_env(ENV_MAX_ATTEMPTS, value)?;
        }
        if let Some(value) = lookup(ENV_REAPER_ENABLED) {
            self.reaper.enabled = parse_bool(ENV_REAPER_ENABLED, value)?;
        }
        if let Some(value) = lookup(ENV_BLOB_ROOT) {
            self.blob.backend = BlobBackend::Filesystem;
            self.blob.root = value.into();
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = match value.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => return Err(invalid_env(ENV_LOG_FORMAT, value, "expected pretty or json")),
            };
        }

        debug!(
            backend = ?self.storage.backend,
            workers = self.consumer.workers,
            "Applied environment overrides"
        );
        Ok(())
    }
}

fn invalid_env(var: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        value,
        reason: reason.to_string(),
    }
}

fn parse_env<T>(var: &'static str, value: String) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| invalid_env(var, value.clone(), &e.to_string()))
}

fn parse_bool(var: &'static str, value: String) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_env(var, value, "expected a boolean")),
    }
}
