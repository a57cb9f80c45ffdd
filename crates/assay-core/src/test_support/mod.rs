//! Test Support
//!
//! Fault injection for port adapters. [`Faulty`] wraps any adapter and fails
//! selected operations on demand while delegating everything else, so tests
//! can exercise partial-failure paths against the real in-memory backends.
//!
//! ```rust
//! use std::sync::Arc;
//! use assay_core::adapters::InMemoryGraphStore;
//! use assay_core::model::WorkspaceId;
//! use assay_core::ports::GraphStore;
//! use assay_core::test_support::{FaultOp, Faulty};
//!
//! # async fn example() {
//! let graph = Faulty::new(Arc::new(InMemoryGraphStore::new()));
//! graph.faults().fail(FaultOp::GraphDelete);
//!
//! assert!(graph.delete_workspace(&WorkspaceId::from("w1")).await.is_err());
//! assert_eq!(graph.faults().calls(FaultOp::GraphDelete), 1);
//! # }
//! ```

mod faults;

pub use faults::{FaultOp, Faults, Faulty};
