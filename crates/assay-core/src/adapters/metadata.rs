//! In-memory metadata and payload store
//!
//! Documents are kept normalized in an arena keyed by `(workspace_id, document_id)`
//! rather than embedded in the workspace record. `DashMap` entry locks give
//! per-key isolation: updating one document never touches its siblings, and
//! structural changes (append, completion marker) serialize on the workspace entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::error::PortResult;
use crate::model::{
    AppendOutcome, Document, DocumentId, DocumentUpdate, GraphPayload, OwnerId, PayloadId,
    StaleDocument, UpdateOutcome, Workspace, WorkspaceId,
};
use crate::ports::{MetadataStore, PayloadStore};

type DocumentKey = (WorkspaceId, DocumentId);

/// Workspace row without its documents
#[derive(Debug, Clone)]
struct WorkspaceRecord {
    id: WorkspaceId,
    owner_id: OwnerId,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completion_notified_at: Option<DateTime<Utc>>,
    document_order: Vec<DocumentId>,
}

/// Metadata + payload store backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    workspaces: DashMap<WorkspaceId, WorkspaceRecord>,
    documents: DashMap<DocumentKey, Document>,
    payloads: DashMap<PayloadId, GraphPayload>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads currently stored, across all workspaces
    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }

    /// Number of payloads stored for one workspace
    pub fn payload_count_for(&self, workspace_id: &WorkspaceId) -> usize {
        self.payloads
            .iter()
            .filter(|p| &p.workspace_id == workspace_id)
            .count()
    }

    fn snapshot(&self, id: &WorkspaceId) -> Option<Workspace> {
        // Clone the record first so no workspace lock is held while reading documents
        let record = self.workspaces.get(id)?.clone();

        let documents = record
            .document_order
            .iter()
            .filter_map(|doc_id| {
                self.documents
                    .get(&(record.id.clone(), doc_id.clone()))
                    .map(|d| d.clone())
            })
            .collect();

        Some(Workspace {
            id: record.id,
            owner_id: record.owner_id,
            name: record.name,
            documents,
            created_at: record.created_at,
            updated_at: record.updated_at,
            completion_notified_at: record.completion_notified_at,
        })
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert_workspace(&self, workspace: Workspace) -> PortResult<()> {
        let record = WorkspaceRecord {
            id: workspace.id.clone(),
            owner_id: workspace.owner_id,
            name: workspace.name,
            created_at: workspace.created_at,
            updated_at: workspace.updated_at,
            completion_notified_at: workspace.completion_notified_at,
            document_order: workspace.documents.iter().map(|d| d.id.clone()).collect(),
        };

        for doc in workspace.documents {
            self.documents
                .insert((workspace.id.clone(), doc.id.clone()), doc);
        }
        self.workspaces.insert(workspace.id, record);
        Ok(())
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> PortResult<Option<Workspace>> {
        Ok(self.snapshot(id))
    }

    async fn list_workspaces(&self, owner_id: &str) -> PortResult<Vec<Workspace>> {
        let mut ids: Vec<WorkspaceId> = self
            .workspaces
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();

        Ok(ids.iter().filter_map(|id| self.snapshot(id)).collect())
    }

    async fn append_document(
        &self,
        workspace_id: &WorkspaceId,
        document: Document,
    ) -> PortResult<AppendOutcome> {
        let Some(mut record) = self.workspaces.get_mut(workspace_id) else {
            return Ok(AppendOutcome::WorkspaceMissing);
        };

        let key = (workspace_id.clone(), document.id.clone());
        if self.documents.contains_key(&key) {
            return Ok(AppendOutcome::DuplicateId);
        }

        record.document_order.push(document.id.clone());
        record.completion_notified_at = None;
        record.updated_at = Utc::now();
        self.documents.insert(key, document);
        Ok(AppendOutcome::Appended)
    }

    async fn update_document(
        &self,
        workspace_id: &WorkspaceId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> PortResult<UpdateOutcome> {
        let key = (workspace_id.clone(), document_id.clone());
        let Some(mut doc) = self.documents.get_mut(&key) else {
            return Ok(UpdateOutcome::Missing);
        };

        if doc.apply(&update) {
            Ok(UpdateOutcome::Applied(doc.clone()))
        } else {
            Ok(UpdateOutcome::Unchanged(doc.clone()))
        }
    }

    async fn mark_completion_notified(
        &self,
        workspace_id: &WorkspaceId,
        at: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Holding the workspace entry blocks appends, so no new Pending document
        // can appear while the siblings are checked. Document updates may still
        // land concurrently, but they only ever move towards terminal states.
        let Some(mut record) = self.workspaces.get_mut(workspace_id) else {
            return Ok(false);
        };

        if record.completion_notified_at.is_some() || record.document_order.is_empty() {
            return Ok(false);
        }

        let all_terminal = record.document_order.iter().all(|doc_id| {
            self.documents
                .get(&(workspace_id.clone(), doc_id.clone()))
                .map(|d| d.status.is_terminal())
                .unwrap_or(true)
        });
        if !all_terminal {
            return Ok(false);
        }

        record.completion_notified_at = Some(at);
        Ok(true)
    }

    async fn find_stale_documents(&self, cutoff: DateTime<Utc>) -> PortResult<Vec<StaleDocument>> {
        let candidates: Vec<(DocumentKey, Document)> = self
            .documents
            .iter()
            .filter(|entry| entry.status.is_active() && entry.updated_at < cutoff)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut stale = Vec::with_capacity(candidates.len());
        for ((workspace_id, document_id), doc) in candidates {
            let Some(owner_id) = self.workspaces.get(&workspace_id).map(|r| r.owner_id.clone())
            else {
                continue;
            };
            stale.push(StaleDocument {
                workspace_id,
                owner_id,
                document_id,
                status: doc.status,
                updated_at: doc.updated_at,
            });
        }
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(stale)
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<bool> {
        let Some((_, record)) = self.workspaces.remove(workspace_id) else {
            return Ok(false);
        };

        for doc_id in &record.document_order {
            self.documents
                .remove(&(workspace_id.clone(), doc_id.clone()));
        }
        self.payloads.retain(|_, p| &p.workspace_id != workspace_id);

        debug!(
            workspace_id = %workspace_id,
            documents = record.document_order.len(),
            "Removed workspace and payloads"
        );
        Ok(true)
    }
}

#[async_trait]
impl PayloadStore for InMemoryMetadataStore {
    async fn put_payload(&self, payload: GraphPayload) -> PortResult<()> {
        self.payloads.insert(payload.id.clone(), payload);
        Ok(())
    }

    async fn get_payloads(&self, ids: &[PayloadId]) -> PortResult<Vec<GraphPayload>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.payloads.get(id).map(|p| p.clone()))
            .collect())
    }

    async fn delete_payload(&self, id: &PayloadId) -> PortResult<bool> {
        Ok(self.payloads.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentStatus, GraphData};

    fn doc(id: &str) -> Document {
        Document::pending_upload(DocumentId::from(id), format!("k/{}", id), id)
    }

    async fn seeded(docs: &[&str]) -> (InMemoryMetadataStore, WorkspaceId) {
        let store = InMemoryMetadataStore::new();
        let ws = Workspace::new("u1", "papers");
        let id = ws.id.clone();
        store.insert_workspace(ws).await.unwrap();
        for d in docs {
            store.append_document(&id, doc(d)).await.unwrap();
        }
        (store, id)
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_rejects_duplicates() {
        let (store, ws) = seeded(&["d1", "d2"]).await;

        assert_eq!(
            store.append_document(&ws, doc("d1")).await.unwrap(),
            AppendOutcome::DuplicateId
        );
        assert_eq!(
            store
                .append_document(&WorkspaceId::from("nope"), doc("d3"))
                .await
                .unwrap(),
            AppendOutcome::WorkspaceMissing
        );

        let loaded = store.get_workspace(&ws).await.unwrap().unwrap();
        let ids: Vec<&str> = loaded.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_update_touches_only_target_document() {
        let (store, ws) = seeded(&["d1", "d2"]).await;
        let before = store.get_workspace(&ws).await.unwrap().unwrap();

        let outcome = store
            .update_document(&ws, &DocumentId::from("d1"), DocumentUpdate::failed("boom"))
            .await
            .unwrap();
        assert!(
            matches!(outcome, UpdateOutcome::Applied(ref d) if d.status == DocumentStatus::Failed)
        );

        let after = store.get_workspace(&ws).await.unwrap().unwrap();
        assert_eq!(after.documents[1], before.documents[1]);

        let again = store
            .update_document(
                &ws,
                &DocumentId::from("d1"),
                DocumentUpdate::completed(Some("r".into()), None),
            )
            .await
            .unwrap();
        assert!(
            matches!(again, UpdateOutcome::Unchanged(ref d) if d.status == DocumentStatus::Failed)
        );

        let missing = store
            .update_document(&ws, &DocumentId::from("d9"), DocumentUpdate::processing())
            .await
            .unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_completion_marker_is_claimed_once() {
        let (store, ws) = seeded(&["d1"]).await;
        assert!(!store.mark_completion_notified(&ws, Utc::now()).await.unwrap());

        store
            .update_document(&ws, &DocumentId::from("d1"), DocumentUpdate::failed("x"))
            .await
            .unwrap();
        assert!(store.mark_completion_notified(&ws, Utc::now()).await.unwrap());
        assert!(!store.mark_completion_notified(&ws, Utc::now()).await.unwrap());

        // A new batch reopens the marker once it settles
        store.append_document(&ws, doc("d2")).await.unwrap();
        assert!(!store.mark_completion_notified(&ws, Utc::now()).await.unwrap());
        store
            .update_document(&ws, &DocumentId::from("d2"), DocumentUpdate::failed("y"))
            .await
            .unwrap();
        assert!(store.mark_completion_notified(&ws, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_payloads_of_that_workspace_only() {
        let (store, ws) = seeded(&["d1"]).await;
        let other_ws = Workspace::new("u2", "other");
        let other = other_ws.id.clone();
        store.insert_workspace(other_ws).await.unwrap();

        store
            .put_payload(GraphPayload::new(
                ws.clone(),
                DocumentId::from("d1"),
                "u1",
                GraphData::default(),
            ))
            .await
            .unwrap();
        store
            .put_payload(GraphPayload::new(
                other.clone(),
                DocumentId::from("x"),
                "u2",
                GraphData::default(),
            ))
            .await
            .unwrap();

        assert!(store.delete_workspace(&ws).await.unwrap());
        assert!(!store.delete_workspace(&ws).await.unwrap());
        assert!(store.get_workspace(&ws).await.unwrap().is_none());
        assert_eq!(store.payload_count_for(&ws), 0);
        assert_eq!(store.payload_count_for(&other), 1);
    }

    #[tokio::test]
    async fn test_get_payloads_keeps_request_order() {
        let store = InMemoryMetadataStore::new();
        let ws = WorkspaceId::from("w");
        let payload = |doc: &str| {
            GraphPayload::new(ws.clone(), DocumentId::from(doc), "u", GraphData::default())
        };
        let (a, b) = (payload("a"), payload("b"));
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        store.put_payload(a).await.unwrap();
        store.put_payload(b).await.unwrap();

        let loaded = store
            .get_payloads(&[b_id.clone(), PayloadId::from("missing"), a_id.clone()])
            .await
            .unwrap();
        let ids: Vec<PayloadId> = loaded.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b_id, a_id]);
    }

    #[tokio::test]
    async fn test_find_stale_documents() {
        let (store, ws) = seeded(&["d1", "d2"]).await;
        store
            .update_document(&ws, &DocumentId::from("d2"), DocumentUpdate::failed("x"))
            .await
            .unwrap();

        let future = Utc::now() + chrono::Duration::seconds(5);
        let stale = store.find_stale_documents(future).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].document_id, DocumentId::from("d1"));
        assert_eq!(stale[0].owner_id, "u1");

        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(store.find_stale_documents(past).await.unwrap().is_empty());
    }
}
