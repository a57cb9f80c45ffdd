//! Concurrent delivery tests
//!
//! Results for sibling documents and duplicate deliveries of the same result
//! are reconciled in parallel on a multi-threaded runtime.

mod common;

use anyhow::Result;
use assay_core::{DocumentStatus, MetadataStore, PayloadStore};
use common::{completed, failed, Harness};
use futures::future::join_all;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_workspace_ready_fires_exactly_once_under_concurrency() -> Result<()> {
    for round in 0..10 {
        let h = Arc::new(Harness::new());
        let (ws, docs) = h.workspace_with_files(12).await;

        let tasks = docs.iter().enumerate().map(|(i, doc)| {
            let h = Arc::clone(&h);
            let message = if i % 3 == 0 {
                failed(&ws, doc, "parse error")
            } else {
                completed(&ws, doc)
            };
            tokio::spawn(async move { h.reconciler.handle(&message).await })
        });

        let outcomes = join_all(tasks).await;
        let ready_claims = outcomes
            .into_iter()
            .map(|joined| joined.expect("task panicked").expect("reconcile"))
            .filter(|outcome| outcome.workspace_ready())
            .count();

        assert_eq!(ready_claims, 1, "round {}", round);
        assert_eq!(h.gateway().count_event("WORKSPACE_READY"), 1, "round {}", round);
        assert_eq!(h.gateway().count_event("DOCUMENT_COMPLETED"), 8);
        assert_eq!(h.gateway().count_event("DOCUMENT_FAILED"), 4);

        let workspace = h.store().get_workspace(&ws).await?.unwrap();
        let progress = workspace.progress();
        assert_eq!((progress.completed, progress.failed), (8, 4));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_sibling_updates_do_not_clobber_each_other() -> Result<()> {
    let h = Arc::new(Harness::new());
    let (ws, docs) = h.workspace_with_files(32).await;

    let tasks = docs.iter().map(|doc| {
        let h = Arc::clone(&h);
        let message = completed(&ws, doc);
        tokio::spawn(async move { h.reconciler.handle(&message).await })
    });
    for joined in join_all(tasks).await {
        joined??;
    }

    let workspace = h.store().get_workspace(&ws).await?.unwrap();
    assert_eq!(workspace.documents.len(), 32);
    for doc in &workspace.documents {
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.result_ref.as_deref(), Some(format!("graph-{}", doc.id).as_str()));
        assert!(doc.payload_ref.is_some());
    }
    assert_eq!(h.store().payload_count_for(&ws), 32);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_duplicate_deliveries_leave_one_payload() -> Result<()> {
    for _ in 0..10 {
        let h = Arc::new(Harness::new());
        let (ws, docs) = h.workspace_with_files(1).await;
        let message = completed(&ws, &docs[0]);

        let tasks = (0..6).map(|_| {
            let h = Arc::clone(&h);
            let message = message.clone();
            tokio::spawn(async move { h.reconciler.handle(&message).await })
        });
        for joined in join_all(tasks).await {
            joined??;
        }

        let workspace = h.store().get_workspace(&ws).await?.unwrap();
        let payload_ref = workspace.documents[0].payload_ref.clone().unwrap();
        assert_eq!(h.store().payload_count_for(&ws), 1);
        assert_eq!(
            h.store().get_payloads(&[payload_ref]).await?.len(),
            1,
            "the surviving payload is the referenced one"
        );
        assert_eq!(h.gateway().count_event("DOCUMENT_COMPLETED"), 1);
        assert_eq!(h.gateway().count_event("WORKSPACE_READY"), 1);
    }
    Ok(())
}
