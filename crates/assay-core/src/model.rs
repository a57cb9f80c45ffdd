//! Workspace, document and graph payload records.
//!
//! A [`Workspace`] is a named collection of [`Document`]s owned by one user. Each
//! document is one ingestion job; its extracted graph lives apart from the
//! workspace as a [`GraphPayload`] because metadata stores have size ceilings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of the user owning a workspace
pub type OwnerId = String;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Allocate a fresh, time-sortable identifier
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Opaque, sortable workspace identifier
    WorkspaceId
);
string_id!(
    /// Document identifier; doubles as the ingest job's task id
    DocumentId
);
string_id!(
    /// Key into the payload store
    PayloadId
);

/// Lifecycle state of one ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Completed and Failed are terminal; nothing is ever applied after them
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Still waiting on the external extraction process
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Monotone transitions: Pending -> (Processing) -> {Completed, Failed}
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

/// Where a document's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Uploaded bytes held in the blob store
    #[default]
    File,
    /// An existing note
    Note,
    /// An existing conversation
    Conversation,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Note => "note",
            SourceKind::Conversation => "conversation",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(SourceKind::File),
            "note" => Ok(SourceKind::Note),
            "conversation" => Ok(SourceKind::Conversation),
            other => Err(format!("unknown source kind '{}'", other)),
        }
    }
}

/// One ingestion job and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub source_kind: SourceKind,

    /// Blob key; `None` when the source is an existing note/conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Note or conversation id for reference sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    pub display_name: String,
    pub status: DocumentStatus,

    /// Id of the produced graph subtree, set only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,

    /// Set only when extraction produced graph data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<PayloadId>,

    /// Set only on Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A Pending document for uploaded bytes stored under `blob_key`
    pub fn pending_upload(
        id: DocumentId,
        blob_key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_kind: SourceKind::File,
            source_ref: Some(blob_key.into()),
            source_id: None,
            display_name: display_name.into(),
            status: DocumentStatus::Pending,
            result_ref: None,
            payload_ref: None,
            error: None,
            schema_hint: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A Pending document sourced from an existing note or conversation
    pub fn pending_reference(
        id: DocumentId,
        source_kind: SourceKind,
        source_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_kind,
            source_ref: None,
            source_id: Some(source_id.into()),
            display_name: display_name.into(),
            status: DocumentStatus::Pending,
            result_ref: None,
            payload_ref: None,
            error: None,
            schema_hint: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style: set the schema hint
    #[must_use]
    pub fn with_schema_hint(mut self, schema_hint: Option<String>) -> Self {
        self.schema_hint = schema_hint;
        self
    }

    /// Apply an update if the status transition is allowed
    ///
    /// Returns `false` and leaves every field untouched otherwise.
    pub fn apply(&mut self, update: &DocumentUpdate) -> bool {
        if !self.status.can_transition_to(update.status) {
            return false;
        }

        self.status = update.status;
        self.result_ref = update.result_ref.clone();
        self.payload_ref = update.payload_ref.clone();
        self.error = update.error.clone();
        self.updated_at = update.updated_at;
        true
    }
}

/// Field changes applied atomically to exactly one document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    pub status: DocumentStatus,
    pub result_ref: Option<String>,
    pub payload_ref: Option<PayloadId>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentUpdate {
    pub fn processing() -> Self {
        Self {
            status: DocumentStatus::Processing,
            result_ref: None,
            payload_ref: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn completed(result_ref: Option<String>, payload_ref: Option<PayloadId>) -> Self {
        Self {
            status: DocumentStatus::Completed,
            result_ref,
            payload_ref,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DocumentStatus::Failed,
            result_ref: None,
            payload_ref: None,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}

/// Result of the conditional single-document update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The transition was applied; carries the updated document
    Applied(Document),
    /// The document exists but the transition was not allowed (already terminal)
    Unchanged(Document),
    /// No document with that `(workspace_id, document_id)`
    Missing,
}

/// Result of appending a document to a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    DuplicateId,
    WorkspaceMissing,
}

/// A named collection of documents owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set once the aggregate ready notification has been claimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_notified_at: Option<DateTime<Utc>>,
}

impl Workspace {
    /// Create an empty workspace with a freshly allocated id
    pub fn new(owner_id: impl Into<OwnerId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::generate(),
            owner_id: owner_id.into(),
            name: name.into(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
            completion_notified_at: None,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| &d.id == id)
    }

    /// Count documents per lifecycle state
    pub fn progress(&self) -> WorkspaceProgress {
        let mut progress = WorkspaceProgress {
            total: self.documents.len(),
            ..WorkspaceProgress::default()
        };
        for doc in &self.documents {
            match doc.status {
                DocumentStatus::Pending => progress.pending += 1,
                DocumentStatus::Processing => progress.processing += 1,
                DocumentStatus::Completed => progress.completed += 1,
                DocumentStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// Payload ids of completed documents, in document order
    pub fn payload_refs(&self) -> Vec<PayloadId> {
        self.documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Completed)
            .filter_map(|d| d.payload_ref.clone())
            .collect()
    }
}

/// Per-status document counts for one workspace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceProgress {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl WorkspaceProgress {
    /// Every document reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.total > 0 && self.pending == 0 && self.processing == 0
    }
}

/// An entity in an extracted knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_chunk_ref: Option<String>,
}

/// A typed relation between two graph nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub start: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_chunk_ref: Option<String>,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Node and edge arrays of a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Append another graph verbatim; duplicates are kept
    pub fn concat(&mut self, other: GraphData) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

/// Extracted graph content for one completed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    pub id: PayloadId,
    pub workspace_id: WorkspaceId,
    pub document_id: DocumentId,
    pub owner_id: OwnerId,
    pub graph_data: GraphData,
    pub created_at: DateTime<Utc>,
}

impl GraphPayload {
    /// Wrap graph data under a freshly allocated payload id
    pub fn new(
        workspace_id: WorkspaceId,
        document_id: DocumentId,
        owner_id: impl Into<OwnerId>,
        graph_data: GraphData,
    ) -> Self {
        Self {
            id: PayloadId::generate(),
            workspace_id,
            document_id,
            owner_id: owner_id.into(),
            graph_data,
            created_at: Utc::now(),
        }
    }
}

/// A document stuck Pending/Processing past a cutoff
#[derive(Debug, Clone, PartialEq)]
pub struct StaleDocument {
    pub workspace_id: WorkspaceId,
    pub owner_id: OwnerId,
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub updated_at: DateTime<Utc>,
}
