//! SQLite storage backend for assay
//!
//! Implements [`MetadataStore`] and [`PayloadStore`] on a single SQLite
//! database so the service keeps its workspaces across restarts.
//!
//! ## Features
//!
//! - **Row-per-document**: status updates touch one row and never rewrite the workspace
//! - **Transactional delete**: workspace, documents and payloads go in one transaction
//! - **WAL Mode**: concurrent readers alongside the single writer
//! - **Off-runtime access**: one mutex-guarded connection, locked inside `spawn_blocking`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use assay_sqlite::{SqliteConfig, SqliteMetadataStore, SqlitePool};
//!
//! # fn main() -> Result<(), assay_sqlite::SqliteError> {
//! let pool = SqlitePool::new(SqliteConfig::new("./assay.db"))?;
//! let store = SqliteMetadataStore::new(pool);
//! # let _ = store;
//! # Ok(())
//! # }
//! ```
//!
//! [`MetadataStore`]: assay_core::MetadataStore
//! [`PayloadStore`]: assay_core::PayloadStore

pub mod config;
pub mod connection;
pub mod error;
pub mod schema;
pub mod store;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use store::SqliteMetadataStore;
