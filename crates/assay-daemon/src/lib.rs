//! assay daemon
//!
//! Composition root for the ingestion service: builds every port adapter
//! from [`AssayConfig`](assay_config::AssayConfig), wires them into the
//! orchestrator, reconciler, consumer pool and reaper, and runs the pool
//! until shutdown is requested.

pub mod lifecycle;
pub mod services;

pub use lifecycle::{run, SHUTDOWN_TIMEOUT};
pub use services::Services;
