//! Ports to the external collaborators of the ingestion pipeline
//!
//! The orchestrator and reconciler depend only on these traits; concrete
//! backends (in-memory, SQLite, filesystem, message brokers) are injected at
//! process start.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use crate::error::PortResult;
use crate::message::{IngestRequestMessage, IngestResultMessage};
use crate::model::{
    AppendOutcome, Document, DocumentId, DocumentUpdate, GraphPayload, PayloadId, StaleDocument,
    UpdateOutcome, Workspace, WorkspaceId,
};
use crate::notification::Notification;

/// Raw uploaded bytes, addressed by key
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> PortResult<()>;

    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> PortResult<()>;
}

/// Durable workspace and document records
///
/// Implementations must mutate exactly one document per [`update_document`]
/// call without read-modify-write of the enclosing workspace, so concurrent
/// updates to sibling documents never race.
///
/// [`update_document`]: MetadataStore::update_document
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_workspace(&self, workspace: Workspace) -> PortResult<()>;

    /// Full workspace with its documents in registration order
    async fn get_workspace(&self, id: &WorkspaceId) -> PortResult<Option<Workspace>>;

    /// All workspaces of one owner, ordered by id
    async fn list_workspaces(&self, owner_id: &str) -> PortResult<Vec<Workspace>>;

    /// Atomically append a document, rejecting duplicate ids
    ///
    /// Appending clears the workspace's completion marker.
    async fn append_document(
        &self,
        workspace_id: &WorkspaceId,
        document: Document,
    ) -> PortResult<AppendOutcome>;

    /// Conditionally apply `update` to the single `(workspace_id, document_id)` entry
    ///
    /// The update is applied only if the stored status may transition to
    /// `update.status`; otherwise the stored document is returned unchanged.
    async fn update_document(
        &self,
        workspace_id: &WorkspaceId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> PortResult<UpdateOutcome>;

    /// Compare-and-set the completion marker
    ///
    /// Succeeds (returns `true`) only if the marker is unset, the workspace has at
    /// least one document and none is Pending or Processing. At most one caller
    /// wins per marker epoch.
    async fn mark_completion_notified(
        &self,
        workspace_id: &WorkspaceId,
        at: DateTime<Utc>,
    ) -> PortResult<bool>;

    /// Documents Pending/Processing whose last update is older than `cutoff`
    async fn find_stale_documents(&self, cutoff: DateTime<Utc>) -> PortResult<Vec<StaleDocument>>;

    /// Remove the workspace record together with its graph payloads
    ///
    /// Backends holding payloads alongside metadata apply both removals as one
    /// unit. Returns `false` if the workspace did not exist.
    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<bool>;
}

/// Large extracted-graph blobs, stored apart from workspace metadata
#[async_trait]
pub trait PayloadStore: Send + Sync {
    async fn put_payload(&self, payload: GraphPayload) -> PortResult<()>;

    /// Batch load in the order of `ids`; missing ids are skipped
    async fn get_payloads(&self, ids: &[PayloadId]) -> PortResult<Vec<GraphPayload>>;

    /// Returns `false` if no payload had that id
    async fn delete_payload(&self, id: &PayloadId) -> PortResult<bool>;
}

/// Durable knowledge-graph database
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Cascading delete of every subgraph belonging to the workspace
    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<()>;
}

/// Request side of the job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, request: IngestRequestMessage) -> PortResult<()>;
}

/// Broker-assigned handle used to acknowledge one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery-{}", self.0)
    }
}

/// One at-least-once delivery of a result message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
    pub message: IngestResultMessage,
}

/// Result side of the job queue, consumed by a pool of workers
#[async_trait]
pub trait ResultQueue: Send + Sync {
    /// Wait up to `wait` for the next delivery
    async fn receive(&self, wait: Duration) -> PortResult<Option<Delivery>>;

    async fn ack(&self, tag: DeliveryTag) -> PortResult<()>;

    /// Return the message to the queue for redelivery after `delay`
    async fn nack(&self, tag: DeliveryTag, delay: Duration) -> PortResult<()>;

    /// Park the message on the dead-letter path; it is never redelivered
    async fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> PortResult<()>;
}

/// Fan-out delivery to the owning user
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn publish(&self, notification: Notification) -> PortResult<()>;
}
