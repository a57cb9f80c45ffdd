//! Core types for assay knowledge-graph ingestion
//!
//! Holds the workspace/document model, the queue wire messages, the outcome
//! notifications and the ports (`BlobStore`, `MetadataStore`, `PayloadStore`,
//! `GraphStore`, `JobQueue`, `ResultQueue`, `NotificationGateway`) that the
//! pipeline is written against, plus in-memory adapters for each port.

pub mod adapters;
pub mod error;
pub mod message;
pub mod model;
pub mod notification;
pub mod ports;
pub mod test_support;

pub use error::{IngestError, IngestResult, Port, PortError, PortResult, Problem};

// Re-export the wire messages
pub use message::{
    ExtractedEdge, ExtractedGraph, ExtractedNode, IngestRequest, IngestRequestMessage,
    IngestResult as IngestResultPayload, IngestResultMessage, ResultStatus, TaskEnvelope,
    TaskType,
};

pub use model::{
    AppendOutcome, Document, DocumentId, DocumentStatus, DocumentUpdate, GraphData, GraphEdge,
    GraphNode, GraphPayload, OwnerId, PayloadId, SourceKind, StaleDocument, UpdateOutcome,
    Workspace, WorkspaceId, WorkspaceProgress,
};

pub use notification::{IngestEvent, Notification};

// Re-export ports (injected as `Arc<dyn ...>` at process start)
pub use ports::{
    BlobStore, Delivery, DeliveryTag, GraphStore, JobQueue, MetadataStore, NotificationGateway,
    PayloadStore, ResultQueue,
};
