//! Port adapters that need no external service
//!
//! Database-backed adapters live in their own crates (see `assay-sqlite`).

pub mod blob;
pub mod graph;
pub mod metadata;
pub mod notify;
pub mod queue;

pub use blob::{FsBlobStore, InMemoryBlobStore};
pub use graph::InMemoryGraphStore;
pub use metadata::InMemoryMetadataStore;
pub use notify::{InMemoryNotificationGateway, TracingNotificationGateway};
pub use queue::{DeadLetter, InMemoryJobQueue, InMemoryResultQueue};
