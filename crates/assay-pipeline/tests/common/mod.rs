//! Common test utilities for pipeline tests.

#![allow(dead_code)]

use assay_core::adapters::{
    InMemoryBlobStore, InMemoryGraphStore, InMemoryJobQueue, InMemoryMetadataStore,
    InMemoryNotificationGateway, InMemoryResultQueue,
};
use assay_core::test_support::Faulty;
use assay_core::{
    BlobStore, DocumentId, ExtractedEdge, ExtractedGraph, ExtractedNode, GraphStore,
    IngestResultMessage, IngestResultPayload, JobQueue, MetadataStore, NotificationGateway,
    PayloadStore, WorkspaceId,
};
use assay_pipeline::{IngestResultReconciler, UploadedFile, WorkspaceOrchestrator};
use std::sync::Arc;

pub const OWNER: &str = "u1";

/// Every port backed by an in-memory adapter behind a fault switchboard
pub struct Harness {
    pub blobs: Arc<Faulty<InMemoryBlobStore>>,
    pub metadata: Arc<Faulty<InMemoryMetadataStore>>,
    pub graph: Arc<Faulty<InMemoryGraphStore>>,
    pub jobs: Arc<Faulty<InMemoryJobQueue>>,
    pub notifier: Arc<Faulty<InMemoryNotificationGateway>>,
    pub results: Arc<InMemoryResultQueue>,
    pub orchestrator: WorkspaceOrchestrator,
    pub reconciler: Arc<IngestResultReconciler>,
}

impl Harness {
    pub fn new() -> Self {
        let blobs = Arc::new(Faulty::new(Arc::new(InMemoryBlobStore::new())));
        let metadata = Arc::new(Faulty::new(Arc::new(InMemoryMetadataStore::new())));
        let graph = Arc::new(Faulty::new(Arc::new(InMemoryGraphStore::new())));
        let jobs = Arc::new(Faulty::new(Arc::new(InMemoryJobQueue::new())));
        let notifier = Arc::new(Faulty::new(Arc::new(InMemoryNotificationGateway::new())));

        let orchestrator = WorkspaceOrchestrator::new(
            blobs.clone() as Arc<dyn BlobStore>,
            metadata.clone() as Arc<dyn MetadataStore>,
            metadata.clone() as Arc<dyn PayloadStore>,
            jobs.clone() as Arc<dyn JobQueue>,
        )
        .with_graph_store(graph.clone() as Arc<dyn GraphStore>);

        let reconciler = Arc::new(IngestResultReconciler::new(
            metadata.clone() as Arc<dyn MetadataStore>,
            metadata.clone() as Arc<dyn PayloadStore>,
            notifier.clone() as Arc<dyn NotificationGateway>,
        ));

        Self {
            blobs,
            metadata,
            graph,
            jobs,
            notifier,
            results: Arc::new(InMemoryResultQueue::new()),
            orchestrator,
            reconciler,
        }
    }

    pub fn store(&self) -> &InMemoryMetadataStore {
        self.metadata.inner()
    }

    pub fn gateway(&self) -> &InMemoryNotificationGateway {
        self.notifier.inner()
    }

    /// Create a workspace for [`OWNER`] and register `count` files in it
    pub async fn workspace_with_files(&self, count: usize) -> (WorkspaceId, Vec<DocumentId>) {
        let files = (0..count)
            .map(|i| {
                UploadedFile::new(format!("doc-{}.pdf", i), format!("bytes {}", i).into_bytes())
            })
            .collect();
        let workspace = self
            .orchestrator
            .create_workspace_and_ingest(OWNER, "papers", files)
            .await
            .expect("create workspace");
        let ids = workspace.documents.iter().map(|d| d.id.clone()).collect();
        (workspace.id, ids)
    }
}

/// One node and one edge pointing at it
pub fn small_graph() -> ExtractedGraph {
    ExtractedGraph {
        nodes: vec![ExtractedNode {
            id: "n1".into(),
            name: "Tokio".into(),
            node_type: "Library".into(),
            description: "async runtime".into(),
            chunk_id: Some("chunk-1".into()),
        }],
        edges: vec![ExtractedEdge {
            id: None,
            source: "n1".into(),
            target: "n1".into(),
            edge_type: "SELF".into(),
            description: String::new(),
            chunk_id: Some("chunk-1".into()),
            evidence: "tokio is tokio".into(),
            confidence: 1.0,
        }],
    }
}

pub fn completed(workspace_id: &WorkspaceId, document_id: &DocumentId) -> IngestResultMessage {
    IngestResultMessage::ingest_result(
        document_id.clone(),
        IngestResultPayload::completed(
            OWNER,
            workspace_id.clone(),
            format!("graph-{}", document_id),
            Some(small_graph()),
        ),
    )
}

pub fn failed(
    workspace_id: &WorkspaceId,
    document_id: &DocumentId,
    error: &str,
) -> IngestResultMessage {
    IngestResultMessage::ingest_result(
        document_id.clone(),
        IngestResultPayload::failed(OWNER, workspace_id.clone(), error),
    )
}
