//! Outcome notifications delivered to the owning user.
//!
//! Delivery is fire-and-forget. Each notification carries a deterministic
//! `dedupe_key` so gateways that support idempotent delivery can drop repeats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Document, DocumentId, DocumentStatus, OwnerId, WorkspaceId, WorkspaceProgress};

/// Event carried by a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum IngestEvent {
    DocumentCompleted {
        workspace_id: WorkspaceId,
        document_id: DocumentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_ref: Option<String>,
    },
    DocumentFailed {
        workspace_id: WorkspaceId,
        document_id: DocumentId,
        error: String,
    },
    WorkspaceReady {
        workspace_id: WorkspaceId,
        total_docs: usize,
        completed_count: usize,
        failed_count: usize,
    },
}

impl IngestEvent {
    pub fn name(&self) -> &'static str {
        match self {
            IngestEvent::DocumentCompleted { .. } => "DOCUMENT_COMPLETED",
            IngestEvent::DocumentFailed { .. } => "DOCUMENT_FAILED",
            IngestEvent::WorkspaceReady { .. } => "WORKSPACE_READY",
        }
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        match self {
            IngestEvent::DocumentCompleted { workspace_id, .. }
            | IngestEvent::DocumentFailed { workspace_id, .. }
            | IngestEvent::WorkspaceReady { workspace_id, .. } => workspace_id,
        }
    }
}

/// A notification addressed to one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub owner_id: OwnerId,
    pub event: IngestEvent,
    pub dedupe_key: String,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    /// Per-document outcome for a terminal document
    ///
    /// Returns `None` for documents that are not terminal.
    pub fn document_outcome(
        owner_id: impl Into<OwnerId>,
        workspace_id: &WorkspaceId,
        document: &Document,
    ) -> Option<Self> {
        let event = match document.status {
            DocumentStatus::Completed => IngestEvent::DocumentCompleted {
                workspace_id: workspace_id.clone(),
                document_id: document.id.clone(),
                result_ref: document.result_ref.clone(),
            },
            DocumentStatus::Failed => IngestEvent::DocumentFailed {
                workspace_id: workspace_id.clone(),
                document_id: document.id.clone(),
                error: document.error.clone().unwrap_or_default(),
            },
            DocumentStatus::Pending | DocumentStatus::Processing => return None,
        };

        let dedupe_key = format!("{}:{}:{}", workspace_id, document.id, event.name());
        Some(Self {
            owner_id: owner_id.into(),
            event,
            dedupe_key,
            emitted_at: Utc::now(),
        })
    }

    /// Aggregate ready signal; `claimed_at` is the completion marker value
    pub fn workspace_ready(
        owner_id: impl Into<OwnerId>,
        workspace_id: &WorkspaceId,
        progress: WorkspaceProgress,
        claimed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            dedupe_key: format!(
                "{}:ready:{}",
                workspace_id,
                claimed_at.timestamp_millis()
            ),
            event: IngestEvent::WorkspaceReady {
                workspace_id: workspace_id.clone(),
                total_docs: progress.total,
                completed_count: progress.completed,
                failed_count: progress.failed,
            },
            emitted_at: Utc::now(),
        }
    }
}
