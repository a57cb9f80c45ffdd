//! # Assay Configuration
//!
//! Typed configuration for the assay ingestion services, loaded from an
//! optional TOML file and overridden by `ASSAY_*` environment variables.
//!
//! ```rust,no_run
//! use assay_config::AssayConfig;
//! use std::path::Path;
//!
//! let config = AssayConfig::load(Some(Path::new("assay.toml")))?;
//! println!("{} workers", config.consumer.workers);
//! # Ok::<(), assay_config::ConfigError>(())
//! ```

pub mod components;
mod config;
mod error;
mod loader;

pub use components::*;
pub use config::AssayConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::*;
