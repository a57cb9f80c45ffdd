//! Stale document reaper
//!
//! Documents whose extraction job never reports back would stay Pending or
//! Processing forever and block the workspace's ready signal. The reaper fails
//! them through the reconciler, so notifications and fan-in behave exactly as
//! for a failure reported by the extraction process.

use assay_config::ReaperConfig;
use assay_core::{
    IngestError, IngestResult, IngestResultMessage, IngestResultPayload, MetadataStore, Port,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconciler::{IngestResultReconciler, Reconciliation};

/// Error recorded on documents failed by the reaper
pub const TIMEOUT_ERROR: &str = "timed out waiting for extraction result";

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub failed: usize,
    pub errors: usize,
}

pub struct StaleDocumentReaper {
    metadata: Arc<dyn MetadataStore>,
    reconciler: Arc<IngestResultReconciler>,
    config: ReaperConfig,
}

impl StaleDocumentReaper {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        reconciler: Arc<IngestResultReconciler>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            metadata,
            reconciler,
            config,
        }
    }

    /// Fail every active document last updated more than `stale_after` before `now`
    ///
    /// Per-document errors are logged and counted; only the initial lookup
    /// failing aborts the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> IngestResult<SweepReport> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after())
            .map_err(|e| IngestError::validation(format!("reaper.stale_after_secs: {}", e)))?;
        let cutoff = now - stale_after;

        let stale = self
            .metadata
            .find_stale_documents(cutoff)
            .await
            .map_err(IngestError::upstream(Port::Metadata))?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for doc in stale {
            let message = IngestResultMessage::ingest_result(
                doc.document_id.clone(),
                IngestResultPayload::failed(
                    doc.owner_id.clone(),
                    doc.workspace_id.clone(),
                    TIMEOUT_ERROR,
                ),
            );

            match self.reconciler.handle(&message).await {
                Ok(Reconciliation::Applied { .. }) => {
                    warn!(
                        workspace_id = %doc.workspace_id,
                        document_id = %doc.document_id,
                        stale_since = %doc.updated_at,
                        "Failed stale document"
                    );
                    report.failed += 1;
                }
                // Finished or deleted since the lookup
                Ok(_) => {}
                Err(e) => {
                    error!(
                        workspace_id = %doc.workspace_id,
                        document_id = %doc.document_id,
                        error = %e,
                        "Failed to reap stale document"
                    );
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                failed = report.failed,
                errors = report.errors,
                "Reaper sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval_secs,
            stale_after_secs = self.config.stale_after_secs,
            "Stale document reaper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!(error = %e, "Reaper sweep failed");
                    }
                }
            }
        }

        debug!("Stale document reaper stopped");
    }
}
