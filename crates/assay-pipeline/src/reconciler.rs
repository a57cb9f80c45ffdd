//! Ingest Result Reconciler
//!
//! Applies one result message to the document it names:
//!
//! 1. **Load + verify**: the workspace must exist and be owned by the message's owner
//! 2. **Persist payload**: completed results with graph content get a fresh `GraphPayload`
//! 3. **Update**: one conditional single-document update (Pending/Processing -> terminal)
//! 4. **Reload** the workspace
//! 5. **Notify** the owner of the document outcome
//! 6. **Fan-in**: claim the workspace completion marker; the winner sends `WORKSPACE_READY`
//!
//! Redelivered results for terminal documents skip steps 2, 3 and 5. Fan-in is
//! re-run for them because the marker makes it safe and it recovers a ready
//! signal lost to a crash between steps 3 and 6.

use assay_core::{
    Document, DocumentStatus, DocumentUpdate, GraphPayload, IngestError, IngestResult,
    IngestResultMessage, MetadataStore, Notification, NotificationGateway, PayloadId,
    PayloadStore, Port, ResultStatus, TaskType, UpdateOutcome, Workspace, WorkspaceId,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error recorded when a failed result carries no message
pub const UNKNOWN_EXTRACTION_ERROR: &str = "extraction failed without an error message";

/// What [`IngestResultReconciler::handle`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The document transitioned to `status`
    Applied {
        status: DocumentStatus,
        workspace_ready: bool,
    },
    /// The document was already past this state; nothing was mutated
    Duplicate {
        status: DocumentStatus,
        workspace_ready: bool,
    },
    /// The workspace or document vanished mid-flight (concurrent delete)
    Discarded,
}

impl Reconciliation {
    pub fn workspace_ready(&self) -> bool {
        match self {
            Reconciliation::Applied {
                workspace_ready, ..
            }
            | Reconciliation::Duplicate {
                workspace_ready, ..
            } => *workspace_ready,
            Reconciliation::Discarded => false,
        }
    }
}

/// Result-side coordinator over the metadata, payload and notification ports
pub struct IngestResultReconciler {
    metadata: Arc<dyn MetadataStore>,
    payloads: Arc<dyn PayloadStore>,
    notifier: Arc<dyn NotificationGateway>,
}

impl IngestResultReconciler {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        payloads: Arc<dyn PayloadStore>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            metadata,
            payloads,
            notifier,
        }
    }

    /// Reconcile one result message
    ///
    /// Errors are returned to the consumer: [`IngestError::is_permanent`]
    /// decides between dead-lettering and redelivery.
    pub async fn handle(&self, message: &IngestResultMessage) -> IngestResult<Reconciliation> {
        validate(message)?;

        let result = &message.payload;
        let workspace_id = &result.workspace_id;
        let document_id = &message.task_id;

        // Step 1: load + verify
        let workspace = self
            .load(workspace_id)
            .await?
            .ok_or_else(|| IngestError::workspace_not_found(workspace_id))?;

        if !workspace.is_owned_by(&result.owner_id) {
            return Err(IngestError::Integrity(format!(
                "result for document {} names owner {} but workspace {} belongs to {}",
                document_id, result.owner_id, workspace_id, workspace.owner_id
            )));
        }

        let document = workspace
            .document(document_id)
            .ok_or_else(|| IngestError::document_not_found(document_id))?;

        let target = target_status(result.status);
        if !document.status.can_transition_to(target) {
            warn!(
                workspace_id = %workspace_id,
                document_id = %document_id,
                stored = %document.status,
                received = %target,
                "Duplicate result, skipping update"
            );
            return self.duplicate(&workspace, document.status).await;
        }

        // Step 2: persist graph payload
        let payload_ref = match (&result.status, &result.graph) {
            (ResultStatus::Completed, Some(graph)) if !graph.is_empty() => {
                let payload = GraphPayload::new(
                    workspace_id.clone(),
                    document_id.clone(),
                    result.owner_id.clone(),
                    graph.clone().into_graph_data(),
                );
                let payload_id = payload.id.clone();
                debug!(
                    workspace_id = %workspace_id,
                    document_id = %document_id,
                    payload_id = %payload_id,
                    nodes = payload.graph_data.nodes.len(),
                    edges = payload.graph_data.edges.len(),
                    "Persisting graph payload"
                );
                self.payloads
                    .put_payload(payload)
                    .await
                    .map_err(IngestError::upstream(Port::Payload))?;
                Some(payload_id)
            }
            _ => None,
        };

        // Step 3: conditional single-document update
        let update = match result.status {
            ResultStatus::Processing => DocumentUpdate::processing(),
            ResultStatus::Completed => {
                DocumentUpdate::completed(result.result_ref.clone(), payload_ref.clone())
            }
            ResultStatus::Failed => DocumentUpdate::failed(
                result
                    .error
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_EXTRACTION_ERROR.to_string()),
            ),
        };

        let outcome = match self
            .metadata
            .update_document(workspace_id, document_id, update)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_payload(payload_ref.as_ref()).await;
                return Err(IngestError::upstream(Port::Metadata)(e));
            }
        };

        let updated = match outcome {
            UpdateOutcome::Applied(doc) => doc,
            UpdateOutcome::Unchanged(doc) => {
                // Lost the race to a concurrent delivery of the same result
                warn!(
                    workspace_id = %workspace_id,
                    document_id = %document_id,
                    stored = %doc.status,
                    "Concurrent duplicate result, discarding payload"
                );
                self.discard_payload(payload_ref.as_ref()).await;
                return self.duplicate(&workspace, doc.status).await;
            }
            UpdateOutcome::Missing => {
                info!(
                    workspace_id = %workspace_id,
                    document_id = %document_id,
                    "Document removed mid-flight, discarding result"
                );
                self.discard_payload(payload_ref.as_ref()).await;
                return Ok(Reconciliation::Discarded);
            }
        };

        info!(
            workspace_id = %workspace_id,
            document_id = %document_id,
            status = %updated.status,
            "Document updated"
        );

        if updated.status == DocumentStatus::Processing {
            return Ok(Reconciliation::Applied {
                status: updated.status,
                workspace_ready: false,
            });
        }

        // Step 4: reload
        let Some(reloaded) = self.load(workspace_id).await? else {
            info!(workspace_id = %workspace_id, "Workspace removed mid-flight");
            return Ok(Reconciliation::Discarded);
        };

        // Step 5: per-document notification
        self.notify_document(&reloaded, &updated).await;

        // Step 6: fan-in
        let workspace_ready = self.fan_in(&reloaded).await?;

        Ok(Reconciliation::Applied {
            status: updated.status,
            workspace_ready,
        })
    }

    async fn duplicate(
        &self,
        workspace: &Workspace,
        status: DocumentStatus,
    ) -> IngestResult<Reconciliation> {
        let workspace_ready = if status.is_terminal() {
            match self.load(&workspace.id).await? {
                Some(current) => self.fan_in(&current).await?,
                None => false,
            }
        } else {
            false
        };

        Ok(Reconciliation::Duplicate {
            status,
            workspace_ready,
        })
    }

    /// Claim the completion marker and send the aggregate notification if won
    async fn fan_in(&self, workspace: &Workspace) -> IngestResult<bool> {
        let progress = workspace.progress();
        if !progress.is_settled() || workspace.completion_notified_at.is_some() {
            return Ok(false);
        }

        let claimed_at = Utc::now();
        let won = self
            .metadata
            .mark_completion_notified(&workspace.id, claimed_at)
            .await
            .map_err(IngestError::upstream(Port::Metadata))?;
        if !won {
            debug!(workspace_id = %workspace.id, "Completion already claimed");
            return Ok(false);
        }

        info!(
            workspace_id = %workspace.id,
            total = progress.total,
            completed = progress.completed,
            failed = progress.failed,
            "Workspace ready"
        );
        self.publish(Notification::workspace_ready(
            workspace.owner_id.clone(),
            &workspace.id,
            progress,
            claimed_at,
        ))
        .await;
        Ok(true)
    }

    async fn notify_document(&self, workspace: &Workspace, document: &Document) {
        if let Some(notification) =
            Notification::document_outcome(workspace.owner_id.clone(), &workspace.id, document)
        {
            self.publish(notification).await;
        }
    }

    /// Notifications are best effort
    async fn publish(&self, notification: Notification) {
        let event = notification.event.name();
        let dedupe_key = notification.dedupe_key.clone();
        if let Err(e) = self.notifier.publish(notification).await {
            warn!(event, dedupe_key = %dedupe_key, error = %e, "Notification delivery failed");
        }
    }

    async fn discard_payload(&self, payload_id: Option<&PayloadId>) {
        let Some(payload_id) = payload_id else {
            return;
        };
        if let Err(e) = self.payloads.delete_payload(payload_id).await {
            warn!(payload_id = %payload_id, error = %e, "Failed to remove unreferenced payload");
        }
    }

    async fn load(&self, workspace_id: &WorkspaceId) -> IngestResult<Option<Workspace>> {
        self.metadata
            .get_workspace(workspace_id)
            .await
            .map_err(IngestError::upstream(Port::Metadata))
    }
}

fn target_status(status: ResultStatus) -> DocumentStatus {
    match status {
        ResultStatus::Processing => DocumentStatus::Processing,
        ResultStatus::Completed => DocumentStatus::Completed,
        ResultStatus::Failed => DocumentStatus::Failed,
    }
}

fn validate(message: &IngestResultMessage) -> IngestResult<()> {
    if message.task_type != TaskType::IngestResult {
        return Err(IngestError::validation(format!(
            "expected an INGEST_RESULT message, got {:?}",
            message.task_type
        )));
    }
    if message.task_id.is_empty() {
        return Err(IngestError::validation("taskId is required"));
    }
    if message.payload.workspace_id.is_empty() {
        return Err(IngestError::validation("workspaceId is required"));
    }
    if message.payload.owner_id.trim().is_empty() {
        return Err(IngestError::validation("ownerId is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::adapters::{InMemoryMetadataStore, InMemoryNotificationGateway};
    use assay_core::{DocumentId, IngestResultPayload};

    fn reconciler() -> (IngestResultReconciler, Arc<InMemoryMetadataStore>) {
        let store = Arc::new(InMemoryMetadataStore::new());
        let reconciler = IngestResultReconciler::new(
            store.clone(),
            store.clone(),
            Arc::new(InMemoryNotificationGateway::new()),
        );
        (reconciler, store)
    }

    #[tokio::test]
    async fn test_rejects_request_messages() {
        let (reconciler, _) = reconciler();
        let mut message = IngestResultMessage::ingest_result(
            DocumentId::from("d1"),
            IngestResultPayload::failed("u1", WorkspaceId::from("w1"), "x"),
        );
        message.task_type = TaskType::IngestRequest;

        let err = reconciler.handle(&message).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_workspace_is_permanent() {
        let (reconciler, _) = reconciler();
        let message = IngestResultMessage::ingest_result(
            DocumentId::from("d1"),
            IngestResultPayload::failed("u1", WorkspaceId::from("gone"), "x"),
        );

        let err = reconciler.handle(&message).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound { kind: "workspace", .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_failed_without_message_gets_placeholder() {
        let (reconciler, store) = reconciler();
        let ws = Workspace::new("u1", "w");
        let ws_id = ws.id.clone();
        store.insert_workspace(ws).await.unwrap();
        store
            .append_document(&ws_id, Document::pending_upload(DocumentId::from("d1"), "k", "a"))
            .await
            .unwrap();

        let mut payload = IngestResultPayload::failed("u1", ws_id.clone(), "");
        payload.error = None;
        let outcome = reconciler
            .handle(&IngestResultMessage::ingest_result(DocumentId::from("d1"), payload))
            .await
            .unwrap();
        assert!(outcome.workspace_ready());

        let stored = store.get_workspace(&ws_id).await.unwrap().unwrap();
        assert_eq!(stored.documents[0].error.as_deref(), Some(UNKNOWN_EXTRACTION_ERROR));
    }
}
