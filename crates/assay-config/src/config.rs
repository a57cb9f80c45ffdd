//! Top-level configuration

use serde::{Deserialize, Serialize};

use crate::components::{
    BlobConfig, ConsumerConfig, LoggingConfig, ReaperConfig, StorageBackend, StorageConfig,
};
use crate::error::{ConfigError, ConfigResult};

/// Complete assay configuration
///
/// Every section is optional in the TOML file; missing sections and fields fall
/// back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssayConfig {
    pub storage: StorageConfig,
    pub consumer: ConsumerConfig,
    pub reaper: ReaperConfig,
    pub blob: BlobConfig,
    pub logging: LoggingConfig,
}

impl AssayConfig {
    /// Reject values the services cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consumer.workers == 0 {
            return Err(ConfigError::invalid("consumer.workers", "must be at least 1"));
        }
        if self.consumer.max_attempts == 0 {
            return Err(ConfigError::invalid("consumer.max_attempts", "must be at least 1"));
        }
        if self.consumer.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("consumer.poll_interval_ms", "must be positive"));
        }
        if self.consumer.retry_base_delay_ms > self.consumer.retry_max_delay_ms {
            return Err(ConfigError::invalid(
                "consumer.retry_base_delay_ms",
                format!(
                    "{} exceeds retry_max_delay_ms {}",
                    self.consumer.retry_base_delay_ms, self.consumer.retry_max_delay_ms
                ),
            ));
        }
        if self.reaper.enabled
            && (self.reaper.interval_secs == 0 || self.reaper.stale_after_secs == 0)
        {
            return Err(ConfigError::invalid(
                "reaper",
                "interval_secs and stale_after_secs must be positive when enabled",
            ));
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.sqlite_path.as_os_str().is_empty()
        {
            return Err(ConfigError::invalid(
                "storage.sqlite_path",
                "required for the sqlite backend",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }
        Ok(())
    }
}
