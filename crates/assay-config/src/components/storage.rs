//! Storage component configuration
//!
//! Selects the metadata/payload backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata and payload backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Storage component configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file, used when `backend = "sqlite"`
    pub sqlite_path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("./assay.db"),
            busy_timeout_ms: 5000,
        }
    }
}
