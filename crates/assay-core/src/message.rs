//! Ingest request/result wire messages.
//!
//! Both directions share the same envelope:
//! `{ taskId, taskType, payload, timestamp }`. The `taskId` of a request is
//! reused as the [`DocumentId`] and comes back unchanged on the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{DocumentId, GraphData, GraphEdge, GraphNode, OwnerId, SourceKind, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    IngestRequest,
    IngestResult,
}

/// Queue message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope<P> {
    pub task_id: DocumentId,
    pub task_type: TaskType,
    pub payload: P,
    pub timestamp: DateTime<Utc>,
}

pub type IngestRequestMessage = TaskEnvelope<IngestRequest>;
pub type IngestResultMessage = TaskEnvelope<IngestResult>;

impl TaskEnvelope<IngestRequest> {
    pub fn ingest_request(task_id: DocumentId, payload: IngestRequest) -> Self {
        Self {
            task_id,
            task_type: TaskType::IngestRequest,
            payload,
            timestamp: Utc::now(),
        }
    }
}

impl TaskEnvelope<IngestResult> {
    pub fn ingest_result(task_id: DocumentId, payload: IngestResult) -> Self {
        Self {
            task_id,
            task_type: TaskType::IngestResult,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Job handed to the external extraction process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub owner_id: OwnerId,
    pub workspace_id: WorkspaceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub source_kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,
}

/// Status reported by the extraction process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Work started; moves a Pending document to Processing
    Processing,
    Completed,
    Failed,
}

/// Outcome reported back by the extraction process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub owner_id: OwnerId,
    pub workspace_id: WorkspaceId,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<ExtractedGraph>,
}

impl IngestResult {
    pub fn completed(
        owner_id: impl Into<OwnerId>,
        workspace_id: WorkspaceId,
        result_ref: impl Into<String>,
        graph: Option<ExtractedGraph>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            workspace_id,
            status: ResultStatus::Completed,
            result_ref: Some(result_ref.into()),
            chunk_count: None,
            schema_hint: None,
            error: None,
            graph,
        }
    }

    pub fn failed(
        owner_id: impl Into<OwnerId>,
        workspace_id: WorkspaceId,
        error: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            workspace_id,
            status: ResultStatus::Failed,
            result_ref: None,
            chunk_count: None,
            schema_hint: None,
            error: Some(error.into()),
            graph: None,
        }
    }

    pub fn processing(owner_id: impl Into<OwnerId>, workspace_id: WorkspaceId) -> Self {
        Self {
            owner_id: owner_id.into(),
            workspace_id,
            status: ResultStatus::Processing,
            result_ref: None,
            chunk_count: None,
            schema_hint: None,
            error: None,
            graph: None,
        }
    }
}

/// Graph content as produced by the extraction process, in its own id space
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedGraph {
    #[serde(default)]
    pub nodes: Vec<ExtractedNode>,
    #[serde(default)]
    pub edges: Vec<ExtractedEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunk_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEdge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub edge_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub confidence: f32,
}

impl ExtractedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Remap into internally addressed graph records
    ///
    /// Every node and edge gets a fresh internal id. Edge endpoints naming a node
    /// of this graph are rewritten to that node's new id; endpoints naming
    /// anything else are kept verbatim.
    pub fn into_graph_data(self) -> GraphData {
        let mut id_map: HashMap<String, String> = HashMap::with_capacity(self.nodes.len());

        let nodes = self
            .nodes
            .into_iter()
            .map(|node| {
                let internal_id = Uuid::new_v4().to_string();
                id_map.insert(node.id, internal_id.clone());
                GraphNode {
                    id: internal_id,
                    name: node.name,
                    node_type: node.node_type,
                    description: node.description,
                    source_chunk_ref: node.chunk_id,
                }
            })
            .collect();

        let resolve = |external: String| id_map.get(&external).cloned().unwrap_or(external);

        let edges = self
            .edges
            .into_iter()
            .map(|edge| GraphEdge {
                id: Uuid::new_v4().to_string(),
                start: resolve(edge.source),
                target: resolve(edge.target),
                edge_type: edge.edge_type,
                description: edge.description,
                source_chunk_ref: edge.chunk_id,
                evidence: edge.evidence,
                confidence: edge.confidence,
            })
            .collect();

        GraphData { nodes, edges }
    }
}
