//! Ingestion Pipeline Layer
//!
//! This crate coordinates assay's asynchronous document ingestion.
//!
//! ## Architecture
//!
//! ```text
//! caller ──> WorkspaceOrchestrator ──> JobQueue ──> (extraction process)
//!                                                         │
//! NotificationGateway <── IngestResultReconciler <── ResultQueue
//!                               ▲                    (ResultConsumer pool)
//!                               └── StaleDocumentReaper
//! ```
//!
//! Infrastructure (in `assay-core`, `assay-sqlite`) only stores and transports;
//! this crate decides the order of operations across stores, the document state
//! machine, and what happens on partial failure.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assay_pipeline::{IngestResultReconciler, WorkspaceOrchestrator, UploadedFile};
//!
//! let orchestrator = WorkspaceOrchestrator::new(blobs, metadata.clone(), payloads.clone(), jobs)
//!     .with_graph_store(graph);
//! let workspace = orchestrator
//!     .create_workspace_and_ingest("u1", "papers", vec![UploadedFile::new("a.pdf", bytes)])
//!     .await?;
//!
//! let reconciler = IngestResultReconciler::new(metadata, payloads, notifier);
//! reconciler.handle(&result_message).await?;
//! ```

pub mod orchestrator;
pub mod reaper;
pub mod reconciler;
pub mod worker;

pub use orchestrator::{
    DispatchReport, ReferenceSource, RejectedFile, UploadedFile, WorkspaceOrchestrator,
};
pub use reaper::{StaleDocumentReaper, SweepReport, TIMEOUT_ERROR};
pub use reconciler::{IngestResultReconciler, Reconciliation, UNKNOWN_EXTRACTION_ERROR};
pub use worker::{ConsumerPool, ConsumerStatsSnapshot, Disposition, ResultConsumer};
