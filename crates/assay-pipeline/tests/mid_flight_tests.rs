//! A workspace deleted while a result is being reconciled
//!
//! The store below removes the workspace right before applying the document
//! update, which is the interleaving a concurrent delete produces.

mod common;

use anyhow::Result;
use assay_core::adapters::{InMemoryMetadataStore, InMemoryNotificationGateway};
use assay_core::{
    AppendOutcome, Document, DocumentId, DocumentUpdate, GraphPayload, MetadataStore, PayloadId,
    PayloadStore, PortResult, StaleDocument, UpdateOutcome, Workspace, WorkspaceId,
};
use assay_pipeline::{IngestResultReconciler, Reconciliation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{completed, OWNER};
use std::sync::Arc;

struct DeleteBeforeUpdate {
    inner: InMemoryMetadataStore,
}

#[async_trait]
impl MetadataStore for DeleteBeforeUpdate {
    async fn insert_workspace(&self, workspace: Workspace) -> PortResult<()> {
        self.inner.insert_workspace(workspace).await
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> PortResult<Option<Workspace>> {
        self.inner.get_workspace(id).await
    }

    async fn list_workspaces(&self, owner_id: &str) -> PortResult<Vec<Workspace>> {
        self.inner.list_workspaces(owner_id).await
    }

    async fn append_document(
        &self,
        workspace_id: &WorkspaceId,
        document: Document,
    ) -> PortResult<AppendOutcome> {
        self.inner.append_document(workspace_id, document).await
    }

    async fn update_document(
        &self,
        workspace_id: &WorkspaceId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> PortResult<UpdateOutcome> {
        self.inner.delete_workspace(workspace_id).await?;
        self.inner
            .update_document(workspace_id, document_id, update)
            .await
    }

    async fn mark_completion_notified(
        &self,
        workspace_id: &WorkspaceId,
        at: DateTime<Utc>,
    ) -> PortResult<bool> {
        self.inner.mark_completion_notified(workspace_id, at).await
    }

    async fn find_stale_documents(&self, cutoff: DateTime<Utc>) -> PortResult<Vec<StaleDocument>> {
        self.inner.find_stale_documents(cutoff).await
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<bool> {
        self.inner.delete_workspace(workspace_id).await
    }
}

#[async_trait]
impl PayloadStore for DeleteBeforeUpdate {
    async fn put_payload(&self, payload: GraphPayload) -> PortResult<()> {
        self.inner.put_payload(payload).await
    }

    async fn get_payloads(&self, ids: &[PayloadId]) -> PortResult<Vec<GraphPayload>> {
        self.inner.get_payloads(ids).await
    }

    async fn delete_payload(&self, id: &PayloadId) -> PortResult<bool> {
        self.inner.delete_payload(id).await
    }
}

#[tokio::test]
async fn test_result_for_workspace_deleted_mid_flight_is_discarded() -> Result<()> {
    let store = Arc::new(DeleteBeforeUpdate {
        inner: InMemoryMetadataStore::new(),
    });
    let gateway = Arc::new(InMemoryNotificationGateway::new());
    let reconciler = IngestResultReconciler::new(store.clone(), store.clone(), gateway.clone());

    let workspace = Workspace::new(OWNER, "papers");
    let ws = workspace.id.clone();
    store.insert_workspace(workspace).await?;
    let doc = DocumentId::from("d1");
    store
        .append_document(&ws, Document::pending_upload(doc.clone(), "k", "a.pdf"))
        .await?;

    let outcome = reconciler.handle(&completed(&ws, &doc)).await?;

    assert_eq!(outcome, Reconciliation::Discarded);
    assert!(store.get_workspace(&ws).await?.is_none());
    assert_eq!(store.inner.payload_count(), 0, "payload written before the update is removed");
    assert!(gateway.published().is_empty());
    Ok(())
}
