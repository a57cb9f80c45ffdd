//! Stale document reaper configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opt-in sweep that fails documents stuck Pending/Processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,
    /// Age after which an active document is considered abandoned
    pub stale_after_secs: u64,
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stale_after_secs: 3600,
            interval_secs: 300,
        }
    }
}

impl ReaperConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
