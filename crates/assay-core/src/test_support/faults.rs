use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PortError, PortResult};
use crate::message::IngestRequestMessage;
use crate::model::{
    AppendOutcome, Document, DocumentId, DocumentUpdate, GraphPayload, PayloadId, StaleDocument,
    UpdateOutcome, Workspace, WorkspaceId,
};
use crate::notification::Notification;
use crate::ports::{
    BlobStore, Delivery, DeliveryTag, GraphStore, JobQueue, MetadataStore, NotificationGateway,
    PayloadStore, ResultQueue,
};

/// Every port operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    BlobPut,
    BlobGet,
    BlobDelete,
    InsertWorkspace,
    GetWorkspace,
    ListWorkspaces,
    AppendDocument,
    UpdateDocument,
    MarkCompletion,
    FindStale,
    DeleteWorkspace,
    PutPayload,
    GetPayloads,
    DeletePayload,
    GraphDelete,
    Enqueue,
    Receive,
    Ack,
    Nack,
    DeadLetter,
    Publish,
}

#[derive(Debug)]
struct FaultState {
    /// `None` fails forever, `Some(n)` fails the next n calls
    failing: HashMap<FaultOp, Option<usize>>,
    calls: HashMap<FaultOp, usize>,
    message: String,
}

impl Default for FaultState {
    fn default() -> Self {
        Self {
            failing: HashMap::new(),
            calls: HashMap::new(),
            message: "simulated failure".to_string(),
        }
    }
}

/// Shared switchboard of injected failures and call counts
#[derive(Debug, Default)]
pub struct Faults {
    state: Mutex<FaultState>,
}

impl Faults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call to `op` until cleared
    pub fn fail(&self, op: FaultOp) {
        self.state.lock().failing.insert(op, None);
    }

    /// Fail the next `times` calls to `op`, then recover
    pub fn fail_times(&self, op: FaultOp, times: usize) {
        self.state.lock().failing.insert(op, Some(times));
    }

    pub fn set_message(&self, message: &str) {
        self.state.lock().message = message.to_string();
    }

    pub fn recover(&self, op: FaultOp) {
        self.state.lock().failing.remove(&op);
    }

    /// Remove every injected failure and reset call counts
    pub fn clear(&self) {
        *self.state.lock() = FaultState::default();
    }

    pub fn calls(&self, op: FaultOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn check(&self, op: FaultOp) -> PortResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        let fail = match state.failing.get_mut(&op) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
        };

        if fail {
            Err(PortError::unavailable(state.message.clone()))
        } else {
            Ok(())
        }
    }
}

/// Adapter wrapper that consults [`Faults`] before delegating
#[derive(Debug)]
pub struct Faulty<T> {
    inner: Arc<T>,
    faults: Arc<Faults>,
}

impl<T> Faulty<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::new()),
        }
    }

    /// Share one switchboard between several wrapped adapters
    pub fn with_faults(inner: Arc<T>, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

#[async_trait]
impl<T: BlobStore> BlobStore for Faulty<T> {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> PortResult<()> {
        self.faults.check(FaultOp::BlobPut)?;
        self.inner.put(key, bytes, content_type).await
    }

    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        self.faults.check(FaultOp::BlobGet)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.faults.check(FaultOp::BlobDelete)?;
        self.inner.delete(key).await
    }
}

#[async_trait]
impl<T: MetadataStore> MetadataStore for Faulty<T> {
    async fn insert_workspace(&self, workspace: Workspace) -> PortResult<()> {
        self.faults.check(FaultOp::InsertWorkspace)?;
        self.inner.insert_workspace(workspace).await
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> PortResult<Option<Workspace>> {
        self.faults.check(FaultOp::GetWorkspace)?;
        self.inner.get_workspace(id).await
    }

    async fn list_workspaces(&self, owner_id: &str) -> PortResult<Vec<Workspace>> {
        self.faults.check(FaultOp::ListWorkspaces)?;
        self.inner.list_workspaces(owner_id).await
    }

    async fn append_document(
        &self,
        workspace_id: &WorkspaceId,
        document: Document,
    ) -> PortResult<AppendOutcome> {
        self.faults.check(FaultOp::AppendDocument)?;
        self.inner.append_document(workspace_id, document).await
    }

    async fn update_document(
        &self,
        workspace_id: &WorkspaceId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> PortResult<UpdateOutcome> {
        self.faults.check(FaultOp::UpdateDocument)?;
        self.inner
            .update_document(workspace_id, document_id, update)
            .await
    }

    async fn mark_completion_notified(
        &self,
        workspace_id: &WorkspaceId,
        at: DateTime<Utc>,
    ) -> PortResult<bool> {
        self.faults.check(FaultOp::MarkCompletion)?;
        self.inner.mark_completion_notified(workspace_id, at).await
    }

    async fn find_stale_documents(&self, cutoff: DateTime<Utc>) -> PortResult<Vec<StaleDocument>> {
        self.faults.check(FaultOp::FindStale)?;
        self.inner.find_stale_documents(cutoff).await
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<bool> {
        self.faults.check(FaultOp::DeleteWorkspace)?;
        self.inner.delete_workspace(workspace_id).await
    }
}

#[async_trait]
impl<T: PayloadStore> PayloadStore for Faulty<T> {
    async fn put_payload(&self, payload: GraphPayload) -> PortResult<()> {
        self.faults.check(FaultOp::PutPayload)?;
        self.inner.put_payload(payload).await
    }

    async fn get_payloads(&self, ids: &[PayloadId]) -> PortResult<Vec<GraphPayload>> {
        self.faults.check(FaultOp::GetPayloads)?;
        self.inner.get_payloads(ids).await
    }

    async fn delete_payload(&self, id: &PayloadId) -> PortResult<bool> {
        self.faults.check(FaultOp::DeletePayload)?;
        self.inner.delete_payload(id).await
    }
}

#[async_trait]
impl<T: GraphStore> GraphStore for Faulty<T> {
    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<()> {
        self.faults.check(FaultOp::GraphDelete)?;
        self.inner.delete_workspace(workspace_id).await
    }
}

#[async_trait]
impl<T: JobQueue> JobQueue for Faulty<T> {
    async fn enqueue(&self, request: IngestRequestMessage) -> PortResult<()> {
        self.faults.check(FaultOp::Enqueue)?;
        self.inner.enqueue(request).await
    }
}

#[async_trait]
impl<T: ResultQueue> ResultQueue for Faulty<T> {
    async fn receive(&self, wait: Duration) -> PortResult<Option<Delivery>> {
        self.faults.check(FaultOp::Receive)?;
        self.inner.receive(wait).await
    }

    async fn ack(&self, tag: DeliveryTag) -> PortResult<()> {
        self.faults.check(FaultOp::Ack)?;
        self.inner.ack(tag).await
    }

    async fn nack(&self, tag: DeliveryTag, delay: Duration) -> PortResult<()> {
        self.faults.check(FaultOp::Nack)?;
        self.inner.nack(tag, delay).await
    }

    async fn dead_letter(&self, tag: DeliveryTag, reason: &str) -> PortResult<()> {
        self.faults.check(FaultOp::DeadLetter)?;
        self.inner.dead_letter(tag, reason).await
    }
}

#[async_trait]
impl<T: NotificationGateway> NotificationGateway for Faulty<T> {
    async fn publish(&self, notification: Notification) -> PortResult<()> {
        self.faults.check(FaultOp::Publish)?;
        self.inner.publish(notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBlobStore;

    #[tokio::test]
    async fn test_fail_times_recovers() {
        let blobs = Faulty::new(Arc::new(InMemoryBlobStore::new()));
        blobs.faults().fail_times(FaultOp::BlobPut, 2);

        assert!(blobs.put("a", vec![1], None).await.is_err());
        assert!(blobs.put("a", vec![1], None).await.is_err());
        blobs.put("a", vec![1], None).await.unwrap();

        assert_eq!(blobs.faults().calls(FaultOp::BlobPut), 3);
        assert!(blobs.inner().contains("a"));
    }

    #[tokio::test]
    async fn test_injected_errors_are_retryable() {
        let blobs = Faulty::new(Arc::new(InMemoryBlobStore::new()));
        blobs.faults().fail(FaultOp::BlobGet);
        blobs.faults().set_message("bucket offline");

        let err = blobs.get("a").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("bucket offline"));

        blobs.faults().recover(FaultOp::BlobGet);
        assert_eq!(blobs.get("a").await.unwrap(), None);
    }
}
