//! Workspace Orchestrator
//!
//! Owns the workspace and document lifecycle on the request side:
//!
//! 1. **Create**: allocate and insert an empty workspace
//! 2. **Register + dispatch**: upload bytes, append a Pending document, enqueue the job
//! 3. **Read**: single workspace, owner listing, aggregated graph
//! 4. **Delete**: graph store first, then metadata + payloads, then blobs
//!
//! Adapter failures never leave this module raw; they are rewrapped as
//! [`IngestError::Upstream`] naming the port they came from.

use assay_core::{
    AppendOutcome, BlobStore, Document, DocumentId, GraphData, GraphStore, IngestError,
    IngestRequest, IngestRequestMessage, IngestResult, JobQueue, MetadataStore, PayloadStore,
    Port, SourceKind, Workspace, WorkspaceId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One uploaded file handed to [`WorkspaceOrchestrator::register_and_dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub schema_hint: Option<String>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes: bytes.into(),
            schema_hint: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_schema_hint(mut self, schema_hint: impl Into<String>) -> Self {
        self.schema_hint = Some(schema_hint.into());
        self
    }
}

/// An existing note or conversation to ingest without uploading bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSource {
    pub kind: SourceKind,
    pub source_id: String,
    /// Falls back to the source id
    pub display_name: Option<String>,
    pub schema_hint: Option<String>,
}

impl ReferenceSource {
    pub fn new(kind: SourceKind, source_id: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            display_name: None,
            schema_hint: None,
        }
    }
}

/// A file the best-effort batch could not register
#[derive(Debug)]
pub struct RejectedFile {
    pub name: String,
    pub error: IngestError,
}

/// Outcome of [`WorkspaceOrchestrator::register_and_dispatch_best_effort`]
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub accepted: Vec<Document>,
    pub rejected: Vec<RejectedFile>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    fn reject(&mut self, workspace_id: &WorkspaceId, name: String, error: IngestError) {
        warn!(workspace_id = %workspace_id, file = %name, error = %error, "Rejected file");
        self.rejected.push(RejectedFile { name, error });
    }
}

/// Request-side coordinator over the blob, metadata, payload, graph and job ports
///
/// ```text
/// WorkspaceOrchestrator
///   ├─> BlobStore      (uploaded bytes)
///   ├─> MetadataStore  (workspace + document records)
///   ├─> PayloadStore   (aggregated graph reads)
///   ├─> GraphStore     (optional, cascade delete)
///   └─> JobQueue       (ingest requests)
/// ```
pub struct WorkspaceOrchestrator {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    payloads: Arc<dyn PayloadStore>,
    graph: Option<Arc<dyn GraphStore>>,
    jobs: Arc<dyn JobQueue>,
}

impl WorkspaceOrchestrator {
    /// Create an orchestrator without a graph store
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        payloads: Arc<dyn PayloadStore>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            blobs,
            metadata,
            payloads,
            graph: None,
            jobs,
        }
    }

    /// Attach the graph store whose cascade delete runs first on workspace deletion
    #[must_use]
    pub fn with_graph_store(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub async fn create_workspace(&self, owner_id: &str, name: &str) -> IngestResult<Workspace> {
        require_owner(owner_id)?;
        if name.trim().is_empty() {
            return Err(IngestError::validation("workspace name is required"));
        }

        let workspace = Workspace::new(owner_id, name.trim());
        self.metadata
            .insert_workspace(workspace.clone())
            .await
            .map_err(IngestError::upstream(Port::Metadata))?;

        info!(workspace_id = %workspace.id, owner_id, "Created workspace");
        Ok(workspace)
    }

    /// Create a workspace and register every file in it
    ///
    /// Returns the workspace as stored after registration.
    pub async fn create_workspace_and_ingest(
        &self,
        owner_id: &str,
        name: &str,
        files: Vec<UploadedFile>,
    ) -> IngestResult<Workspace> {
        if files.is_empty() {
            return Err(IngestError::validation("at least one file is required"));
        }

        let mut workspace = self.create_workspace(owner_id, name).await?;
        workspace.documents = self.register_and_dispatch(owner_id, &workspace.id, files).await?;
        Ok(workspace)
    }

    /// Upload, register and dispatch each file in order
    ///
    /// The first failure stops the batch and is returned; files after it are
    /// neither uploaded nor registered. Files before it stay registered and
    /// are still dispatched.
    ///
    /// Every document of the batch is appended before any of its jobs is
    /// enqueued, so no result can settle the workspace while the batch is
    /// still being registered. A failed enqueue leaves its document and those
    /// after it Pending with no job; only the stale-document reaper resolves
    /// them.
    pub async fn register_and_dispatch(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
        files: Vec<UploadedFile>,
    ) -> IngestResult<Vec<Document>> {
        self.load_owned(owner_id, workspace_id).await?;

        let mut staged = Vec::with_capacity(files.len());
        let mut aborted = None;
        for file in files {
            match self.register_file(owner_id, workspace_id, file).await {
                Ok(entry) => staged.push(entry),
                Err(e) => {
                    aborted = Some(e);
                    break;
                }
            }
        }

        let mut registered = Vec::with_capacity(staged.len());
        for (document, request) in staged {
            self.enqueue(request).await?;
            registered.push(document);
        }

        if let Some(e) = aborted {
            warn!(
                workspace_id = %workspace_id,
                dispatched = registered.len(),
                error = %e,
                "Ingest batch aborted"
            );
            return Err(e);
        }

        info!(
            workspace_id = %workspace_id,
            documents = registered.len(),
            "Dispatched ingest batch"
        );
        Ok(registered)
    }

    /// Like [`register_and_dispatch`](Self::register_and_dispatch) but keeps
    /// going past per-file failures
    ///
    /// Ownership is still checked up front; a missing or foreign workspace
    /// fails the whole call. Registration failures are reported first, in
    /// file order, followed by enqueue failures.
    pub async fn register_and_dispatch_best_effort(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
        files: Vec<UploadedFile>,
    ) -> IngestResult<DispatchReport> {
        self.load_owned(owner_id, workspace_id).await?;

        let mut report = DispatchReport::default();
        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name.clone();
            match self.register_file(owner_id, workspace_id, file).await {
                Ok(entry) => staged.push(entry),
                Err(error) => report.reject(workspace_id, name, error),
            }
        }

        for (document, request) in staged {
            match self.enqueue(request).await {
                Ok(()) => report.accepted.push(document),
                Err(error) => report.reject(workspace_id, document.display_name, error),
            }
        }

        info!(
            workspace_id = %workspace_id,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Dispatched best-effort ingest batch"
        );
        Ok(report)
    }

    /// Register an existing note or conversation and dispatch its job
    pub async fn register_from_reference(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
        source: ReferenceSource,
    ) -> IngestResult<Document> {
        if source.kind == SourceKind::File {
            return Err(IngestError::validation(
                "file sources must be uploaded, not referenced",
            ));
        }
        if source.source_id.trim().is_empty() {
            return Err(IngestError::validation("source id is required"));
        }
        self.load_owned(owner_id, workspace_id).await?;

        let display_name = source
            .display_name
            .clone()
            .unwrap_or_else(|| source.source_id.clone());
        let document = Document::pending_reference(
            DocumentId::generate(),
            source.kind,
            source.source_id.clone(),
            display_name,
        )
        .with_schema_hint(source.schema_hint.clone());

        self.append(workspace_id, document.clone()).await?;
        self.enqueue(IngestRequestMessage::ingest_request(
            document.id.clone(),
            IngestRequest {
                owner_id: owner_id.to_string(),
                workspace_id: workspace_id.clone(),
                blob_key: None,
                source_id: Some(source.source_id),
                source_kind: source.kind,
                schema_hint: source.schema_hint,
            },
        ))
        .await?;

        info!(
            workspace_id = %workspace_id,
            document_id = %document.id,
            source_kind = %document.source_kind,
            "Dispatched reference ingest"
        );
        Ok(document)
    }

    pub async fn get_workspace(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
    ) -> IngestResult<Workspace> {
        self.load_owned(owner_id, workspace_id).await
    }

    /// The owner's workspaces ordered by id (creation order)
    pub async fn list_workspaces(&self, owner_id: &str) -> IngestResult<Vec<Workspace>> {
        require_owner(owner_id)?;
        self.metadata
            .list_workspaces(owner_id)
            .await
            .map_err(IngestError::upstream(Port::Metadata))
    }

    /// Concatenate the graph payloads of every completed document
    ///
    /// Nodes and edges are appended in payload load order with no
    /// deduplication; duplicates across documents are kept as-is.
    pub async fn get_aggregated_graph(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
    ) -> IngestResult<GraphData> {
        let workspace = self.load_owned(owner_id, workspace_id).await?;

        let refs = workspace.payload_refs();
        if refs.is_empty() {
            return Ok(GraphData::default());
        }

        let payloads = self
            .payloads
            .get_payloads(&refs)
            .await
            .map_err(IngestError::upstream(Port::Payload))?;
        if payloads.len() < refs.len() {
            warn!(
                workspace_id = %workspace_id,
                expected = refs.len(),
                loaded = payloads.len(),
                "Some graph payloads are missing"
            );
        }

        let mut graph = GraphData::default();
        for payload in payloads {
            graph.concat(payload.graph_data);
        }
        debug!(
            workspace_id = %workspace_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Aggregated workspace graph"
        );
        Ok(graph)
    }

    /// Delete a workspace across stores
    ///
    /// Order is fixed: the graph store cascade runs first and, if it fails,
    /// nothing else is touched. Only then are the workspace record and its
    /// payloads removed. Blob cleanup runs last and never fails the call.
    pub async fn delete_workspace(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
    ) -> IngestResult<()> {
        let workspace = self.load_owned(owner_id, workspace_id).await?;

        if let Some(graph) = &self.graph {
            graph
                .delete_workspace(workspace_id)
                .await
                .map_err(IngestError::upstream(Port::Graph))?;
            debug!(workspace_id = %workspace_id, "Graph store cascade delete done");
        }

        let removed = self
            .metadata
            .delete_workspace(workspace_id)
            .await
            .map_err(IngestError::upstream(Port::Metadata))?;
        if !removed {
            return Err(IngestError::workspace_not_found(workspace_id));
        }

        for key in workspace.documents.iter().filter_map(|d| d.source_ref.as_deref()) {
            if let Err(e) = self.blobs.delete(key).await {
                warn!(workspace_id = %workspace_id, key, error = %e, "Blob cleanup failed");
            }
        }

        info!(
            workspace_id = %workspace_id,
            documents = workspace.documents.len(),
            "Deleted workspace"
        );
        Ok(())
    }

    /// Upload the bytes and append the Pending document; the job is built but not sent
    async fn register_file(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
        file: UploadedFile,
    ) -> IngestResult<(Document, IngestRequestMessage)> {
        if file.name.trim().is_empty() {
            return Err(IngestError::validation("file name is required"));
        }

        let document_id = DocumentId::generate();
        let blob_key = blob_key(owner_id, workspace_id, &document_id, &file.name);

        self.blobs
            .put(&blob_key, file.bytes, file.content_type.as_deref())
            .await
            .map_err(IngestError::upstream(Port::Blob))?;

        let document = Document::pending_upload(document_id, blob_key.clone(), file.name)
            .with_schema_hint(file.schema_hint.clone());
        if let Err(e) = self.append(workspace_id, document.clone()).await {
            // Nothing references the blob yet
            if let Err(cleanup) = self.blobs.delete(&blob_key).await {
                warn!(blob_key = %blob_key, error = %cleanup, "Failed to remove unregistered blob");
            }
            return Err(e);
        }

        let request = IngestRequestMessage::ingest_request(
            document.id.clone(),
            IngestRequest {
                owner_id: owner_id.to_string(),
                workspace_id: workspace_id.clone(),
                blob_key: Some(blob_key),
                source_id: None,
                source_kind: SourceKind::File,
                schema_hint: file.schema_hint,
            },
        );

        debug!(
            workspace_id = %workspace_id,
            document_id = %document.id,
            "Registered document"
        );
        Ok((document, request))
    }

    async fn append(&self, workspace_id: &WorkspaceId, document: Document) -> IngestResult<()> {
        let outcome = self
            .metadata
            .append_document(workspace_id, document.clone())
            .await
            .map_err(IngestError::upstream(Port::Metadata))?;

        match outcome {
            AppendOutcome::Appended => Ok(()),
            AppendOutcome::WorkspaceMissing => Err(IngestError::workspace_not_found(workspace_id)),
            AppendOutcome::DuplicateId => Err(IngestError::Integrity(format!(
                "document id {} already exists in workspace {}",
                document.id, workspace_id
            ))),
        }
    }

    async fn enqueue(&self, request: IngestRequestMessage) -> IngestResult<()> {
        self.jobs
            .enqueue(request)
            .await
            .map_err(IngestError::upstream(Port::Queue))
    }

    /// Load a workspace and check the caller owns it
    async fn load_owned(
        &self,
        owner_id: &str,
        workspace_id: &WorkspaceId,
    ) -> IngestResult<Workspace> {
        require_owner(owner_id)?;
        let workspace = self
            .metadata
            .get_workspace(workspace_id)
            .await
            .map_err(IngestError::upstream(Port::Metadata))?
            .ok_or_else(|| IngestError::workspace_not_found(workspace_id))?;

        if !workspace.is_owned_by(owner_id) {
            return Err(IngestError::Forbidden(format!(
                "workspace {} belongs to another user",
                workspace_id
            )));
        }
        Ok(workspace)
    }
}

fn require_owner(owner_id: &str) -> IngestResult<()> {
    if owner_id.trim().is_empty() {
        return Err(IngestError::validation("owner id is required"));
    }
    Ok(())
}

/// `{owner}/{workspace}/{document}/{file name}` with path separators in the
/// file name flattened
fn blob_key(
    owner_id: &str,
    workspace_id: &WorkspaceId,
    document_id: &DocumentId,
    file_name: &str,
) -> String {
    let safe_name: String = file_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let safe_name = if safe_name == ".." || safe_name == "." {
        "_".to_string()
    } else {
        safe_name
    };
    format!("{}/{}/{}/{}", owner_id, workspace_id, document_id, safe_name)
}
