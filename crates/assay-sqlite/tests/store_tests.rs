//! File-backed SQLite store: persistence and concurrent writers

use assay_core::{
    Document, DocumentId, DocumentStatus, DocumentUpdate, MetadataStore, UpdateOutcome, Workspace,
    WorkspaceId,
};
use assay_sqlite::{SqliteConfig, SqliteMetadataStore, SqlitePool};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> SqliteMetadataStore {
    let pool = SqlitePool::new(SqliteConfig::new(dir.path().join("assay.db"))).expect("open db");
    SqliteMetadataStore::new(pool)
}

async fn seed(store: &SqliteMetadataStore, count: usize) -> (WorkspaceId, Vec<DocumentId>) {
    let workspace = Workspace::new("u1", "papers");
    let ws = workspace.id.clone();
    store.insert_workspace(workspace).await.unwrap();

    let mut docs = Vec::with_capacity(count);
    for i in 0..count {
        let id = DocumentId::new(format!("d{}", i));
        store
            .append_document(&ws, Document::pending_upload(id.clone(), "k", format!("f{}.pdf", i)))
            .await
            .unwrap();
        docs.push(id);
    }
    (ws, docs)
}

#[tokio::test]
async fn test_workspace_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let ws = {
        let store = open(&dir);
        let (ws, docs) = seed(&store, 2).await;
        store
            .update_document(&ws, &docs[0], DocumentUpdate::failed("parse error"))
            .await
            .unwrap();
        ws
    };

    let store = open(&dir);
    let workspace = store.get_workspace(&ws).await.unwrap().expect("persisted");
    assert_eq!(workspace.documents.len(), 2);
    assert_eq!(workspace.documents[0].status, DocumentStatus::Failed);
    assert_eq!(workspace.documents[0].error.as_deref(), Some("parse error"));
    assert_eq!(workspace.documents[1].status, DocumentStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_sibling_updates_and_single_marker_claim() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    let (ws, docs) = seed(&store, 24).await;

    let updates = docs.iter().cloned().map(|doc| {
        let store = Arc::clone(&store);
        let ws = ws.clone();
        tokio::spawn(async move {
            let update = DocumentUpdate::completed(Some(format!("r-{}", doc)), None);
            let outcome = store.update_document(&ws, &doc, update).await.unwrap();
            assert!(matches!(outcome, UpdateOutcome::Applied(_)));
            store.mark_completion_notified(&ws, Utc::now()).await.unwrap()
        })
    });

    let claims = join_all(updates)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .filter(|claimed| *claimed)
        .count();
    assert_eq!(claims, 1);

    let workspace = store.get_workspace(&ws).await.unwrap().unwrap();
    assert!(workspace.completion_notified_at.is_some());
    for doc in &workspace.documents {
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.result_ref.as_deref(), Some(format!("r-{}", doc.id).as_str()));
    }
}
