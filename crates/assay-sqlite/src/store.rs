//! MetadataStore and PayloadStore implementation for SQLite
//!
//! Every document is its own row, so a status update touches exactly one row
//! and never rewrites the workspace. Multi-statement operations (append,
//! conditional update, delete) run inside `IMMEDIATE` transactions, which also
//! keeps them correct when several processes share the database file.

use crate::connection::SqlitePool;
use crate::error::SqliteResult;
use assay_core::{
    AppendOutcome, Document, DocumentId, DocumentStatus, DocumentUpdate, GraphData, GraphPayload,
    MetadataStore, PayloadId, PayloadStore, PortError, PortResult, StaleDocument, UpdateOutcome,
    Workspace, WorkspaceId,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::str::FromStr;
use tracing::debug;

const DOCUMENT_COLUMNS: &str = "id, source_kind, source_ref, source_id, display_name, status, \
     result_ref, payload_ref, error, schema_hint, created_at, updated_at";

/// SQLite-backed workspace metadata and graph payloads
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// [`SqlitePool::run`] with errors mapped onto the port taxonomy
    async fn run<F, T>(&self, f: F) -> PortResult<T>
    where
        F: FnOnce(&mut Connection) -> SqliteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.run(f).await.map_err(PortError::from)
    }
}

/// Fixed-width UTC timestamp; lexical order equals chronological order
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, v)).transpose()
}

fn parse_enum<T: FromStr<Err = String>>(idx: usize, value: String) -> rusqlite::Result<T> {
    value
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: DocumentId::new(row.get::<_, String>(0)?),
        source_kind: parse_enum(1, row.get(1)?)?,
        source_ref: row.get(2)?,
        source_id: row.get(3)?,
        display_name: row.get(4)?,
        status: parse_enum(5, row.get(5)?)?,
        result_ref: row.get(6)?,
        payload_ref: row.get::<_, Option<String>>(7)?.map(PayloadId::new),
        error: row.get(8)?,
        schema_hint: row.get(9)?,
        created_at: parse_ts(10, row.get(10)?)?,
        updated_at: parse_ts(11, row.get(11)?)?,
    })
}

fn insert_document(
    conn: &Connection,
    workspace_id: &WorkspaceId,
    position: i64,
    doc: &Document,
) -> SqliteResult<()> {
    conn.execute(
        r#"
        INSERT INTO documents (workspace_id, id, position, source_kind, source_ref, source_id,
            display_name, status, result_ref, payload_ref, error, schema_hint,
            created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            workspace_id.as_str(),
            doc.id.as_str(),
            position,
            doc.source_kind.as_str(),
            doc.source_ref,
            doc.source_id,
            doc.display_name,
            doc.status.as_str(),
            doc.result_ref,
            doc.payload_ref.as_ref().map(|p| p.as_str()),
            doc.error,
            doc.schema_hint,
            ts(doc.created_at),
            ts(doc.updated_at),
        ],
    )?;
    Ok(())
}

fn load_document(
    conn: &Connection,
    workspace_id: &WorkspaceId,
    document_id: &DocumentId,
) -> SqliteResult<Option<Document>> {
    let sql = format!(
        "SELECT {} FROM documents WHERE workspace_id = ?1 AND id = ?2",
        DOCUMENT_COLUMNS
    );
    let doc = conn
        .query_row(
            &sql,
            params![workspace_id.as_str(), document_id.as_str()],
            row_to_document,
        )
        .optional()?;
    Ok(doc)
}

fn load_workspace(conn: &Connection, id: &WorkspaceId) -> SqliteResult<Option<Workspace>> {
    let workspace = conn
        .query_row(
            "SELECT id, owner_id, name, created_at, updated_at, completion_notified_at
             FROM workspaces WHERE id = ?1",
            [id.as_str()],
            |row| {
                Ok(Workspace {
                    id: WorkspaceId::new(row.get::<_, String>(0)?),
                    owner_id: row.get(1)?,
                    name: row.get(2)?,
                    documents: Vec::new(),
                    created_at: parse_ts(3, row.get(3)?)?,
                    updated_at: parse_ts(4, row.get(4)?)?,
                    completion_notified_at: parse_opt_ts(5, row.get(5)?)?,
                })
            },
        )
        .optional()?;

    let Some(mut workspace) = workspace else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT {} FROM documents WHERE workspace_id = ?1 ORDER BY position",
        DOCUMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    workspace.documents = stmt
        .query_map([id.as_str()], row_to_document)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(workspace))
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_workspace(&self, workspace: Workspace) -> PortResult<()> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO workspaces
                     (id, owner_id, name, created_at, updated_at, completion_notified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    workspace.id.as_str(),
                    workspace.owner_id,
                    workspace.name,
                    ts(workspace.created_at),
                    ts(workspace.updated_at),
                    workspace.completion_notified_at.map(ts),
                ],
            )?;
            for (position, doc) in workspace.documents.iter().enumerate() {
                insert_document(&tx, &workspace.id, position as i64, doc)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> PortResult<Option<Workspace>> {
        let id = id.clone();
        self.run(move |conn| load_workspace(conn, &id)).await
    }

    async fn list_workspaces(&self, owner_id: &str) -> PortResult<Vec<Workspace>> {
        let owner_id = owner_id.to_string();
        self.run(move |conn| {
            let ids: Vec<String> = {
                let mut stmt =
                    conn.prepare("SELECT id FROM workspaces WHERE owner_id = ?1 ORDER BY id")?;
                let rows = stmt.query_map([owner_id.as_str()], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            let mut workspaces = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(workspace) = load_workspace(conn, &WorkspaceId::new(id))? {
                    workspaces.push(workspace);
                }
            }
            Ok(workspaces)
        })
        .await
    }

    async fn append_document(
        &self,
        workspace_id: &WorkspaceId,
        document: Document,
    ) -> PortResult<AppendOutcome> {
        let workspace_id = workspace_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM workspaces WHERE id = ?1",
                    [workspace_id.as_str()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Ok(AppendOutcome::WorkspaceMissing);
            }

            if load_document(&tx, &workspace_id, &document.id)?.is_some() {
                return Ok(AppendOutcome::DuplicateId);
            }

            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM documents WHERE workspace_id = ?1",
                [workspace_id.as_str()],
                |row| row.get(0),
            )?;
            insert_document(&tx, &workspace_id, position, &document)?;

            // A new Pending document opens a new completion epoch
            tx.execute(
                "UPDATE workspaces SET completion_notified_at = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![workspace_id.as_str(), ts(Utc::now())],
            )?;

            tx.commit()?;
            Ok(AppendOutcome::Appended)
        })
        .await
    }

    async fn update_document(
        &self,
        workspace_id: &WorkspaceId,
        document_id: &DocumentId,
        update: DocumentUpdate,
    ) -> PortResult<UpdateOutcome> {
        let workspace_id = workspace_id.clone();
        let document_id = document_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(mut doc) = load_document(&tx, &workspace_id, &document_id)? else {
                return Ok(UpdateOutcome::Missing);
            };
            if !doc.apply(&update) {
                return Ok(UpdateOutcome::Unchanged(doc));
            }

            tx.execute(
                r#"
                UPDATE documents
                SET status = ?3, result_ref = ?4, payload_ref = ?5, error = ?6, updated_at = ?7
                WHERE workspace_id = ?1 AND id = ?2
                "#,
                params![
                    workspace_id.as_str(),
                    document_id.as_str(),
                    doc.status.as_str(),
                    doc.result_ref,
                    doc.payload_ref.as_ref().map(|p| p.as_str()),
                    doc.error,
                    ts(doc.updated_at),
                ],
            )?;
            tx.commit()?;

            debug!(
                workspace_id = %workspace_id,
                document_id = %document_id,
                status = %doc.status,
                "Document updated"
            );
            Ok(UpdateOutcome::Applied(doc))
        })
        .await
    }

    async fn mark_completion_notified(
        &self,
        workspace_id: &WorkspaceId,
        at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let workspace_id = workspace_id.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE workspaces
                SET completion_notified_at = ?2
                WHERE id = ?1
                  AND completion_notified_at IS NULL
                  AND EXISTS (SELECT 1 FROM documents WHERE workspace_id = ?1)
                  AND NOT EXISTS (
                      SELECT 1 FROM documents
                      WHERE workspace_id = ?1 AND status IN ('pending', 'processing')
                  )
                "#,
                params![workspace_id.as_str(), ts(at)],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn find_stale_documents(&self, cutoff: DateTime<Utc>) -> PortResult<Vec<StaleDocument>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT d.workspace_id, w.owner_id, d.id, d.status, d.updated_at
                FROM documents d
                JOIN workspaces w ON w.id = d.workspace_id
                WHERE d.status IN ('pending', 'processing') AND d.updated_at < ?1
                ORDER BY d.updated_at
                "#,
            )?;
            let rows = stmt.query_map([ts(cutoff)], |row| {
                Ok(StaleDocument {
                    workspace_id: WorkspaceId::new(row.get::<_, String>(0)?),
                    owner_id: row.get(1)?,
                    document_id: DocumentId::new(row.get::<_, String>(2)?),
                    status: parse_enum::<DocumentStatus>(3, row.get(3)?)?,
                    updated_at: parse_ts(4, row.get(4)?)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn delete_workspace(&self, workspace_id: &WorkspaceId) -> PortResult<bool> {
        let workspace_id = workspace_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let payloads = tx.execute(
                "DELETE FROM graph_payloads WHERE workspace_id = ?1",
                [workspace_id.as_str()],
            )?;
            tx.execute(
                "DELETE FROM documents WHERE workspace_id = ?1",
                [workspace_id.as_str()],
            )?;
            let removed = tx.execute(
                "DELETE FROM workspaces WHERE id = ?1",
                [workspace_id.as_str()],
            )?;
            tx.commit()?;

            debug!(workspace_id = %workspace_id, payloads, removed, "Workspace deleted");
            Ok(removed > 0)
        })
        .await
    }
}

#[async_trait]
impl PayloadStore for SqliteMetadataStore {
    async fn put_payload(&self, payload: GraphPayload) -> PortResult<()> {
        let graph_json = serde_json::to_string(&payload.graph_data)?;
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO graph_payloads
                    (id, workspace_id, document_id, owner_id, graph_data, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    payload.id.as_str(),
                    payload.workspace_id.as_str(),
                    payload.document_id.as_str(),
                    payload.owner_id,
                    graph_json,
                    ts(payload.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_payloads(&self, ids: &[PayloadId]) -> PortResult<Vec<GraphPayload>> {
        let ids = ids.to_vec();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, workspace_id, document_id, owner_id, graph_data, created_at
                 FROM graph_payloads WHERE id = ?1",
            )?;

            let mut payloads = Vec::with_capacity(ids.len());
            for id in &ids {
                let row = stmt
                    .query_row([id.as_str()], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            parse_ts(5, row.get(5)?)?,
                        ))
                    })
                    .optional()?;

                if let Some((id, workspace_id, document_id, owner_id, graph_json, created_at)) = row
                {
                    let graph_data: GraphData = serde_json::from_str(&graph_json)?;
                    payloads.push(GraphPayload {
                        id: PayloadId::new(id),
                        workspace_id: WorkspaceId::new(workspace_id),
                        document_id: DocumentId::new(document_id),
                        owner_id,
                        graph_data,
                        created_at,
                    });
                }
            }
            Ok(payloads)
        })
        .await
    }

    async fn delete_payload(&self, id: &PayloadId) -> PortResult<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM graph_payloads WHERE id = ?1", [id.as_str()])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_core::{GraphNode, SourceKind};
    use chrono::Duration;

    fn store() -> SqliteMetadataStore {
        SqliteMetadataStore::new(SqlitePool::memory().expect("memory pool"))
    }

    async fn workspace_with(store: &SqliteMetadataStore, docs: &[&str]) -> WorkspaceId {
        let workspace = Workspace::new("u1", "papers");
        let id = workspace.id.clone();
        store.insert_workspace(workspace).await.unwrap();
        for doc in docs {
            let outcome = store
                .append_document(
                    &id,
                    Document::pending_upload(DocumentId::from(*doc), format!("k/{}", doc), *doc),
                )
                .await
                .unwrap();
            assert_eq!(outcome, AppendOutcome::Appended);
        }
        id
    }

    fn graph(node: &str) -> GraphData {
        GraphData {
            nodes: vec![GraphNode {
                id: node.to_string(),
                name: node.to_uppercase(),
                node_type: "Concept".to_string(),
                description: String::new(),
                source_chunk_ref: None,
            }],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn test_documents_keep_registration_order() {
        let store = store();
        let ws = workspace_with(&store, &["c", "a", "b"]).await;

        let workspace = store.get_workspace(&ws).await.unwrap().unwrap();
        let ids: Vec<&str> = workspace.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(workspace.documents[0].source_kind, SourceKind::File);
        assert_eq!(workspace.documents[0].source_ref.as_deref(), Some("k/c"));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicates_and_missing_workspace() {
        let store = store();
        let ws = workspace_with(&store, &["d1"]).await;

        let dup = store
            .append_document(&ws, Document::pending_upload("d1".into(), "k", "x"))
            .await
            .unwrap();
        assert_eq!(dup, AppendOutcome::DuplicateId);

        let missing = store
            .append_document(&"nope".into(), Document::pending_upload("d2".into(), "k", "x"))
            .await
            .unwrap();
        assert_eq!(missing, AppendOutcome::WorkspaceMissing);
    }

    #[tokio::test]
    async fn test_update_is_conditional_on_transition() {
        let store = store();
        let ws = workspace_with(&store, &["d1"]).await;
        let doc = DocumentId::from("d1");

        let applied = store
            .update_document(&ws, &doc, DocumentUpdate::completed(Some("r1".into()), None))
            .await
            .unwrap();
        assert!(matches!(
            applied,
            UpdateOutcome::Applied(ref d) if d.status == DocumentStatus::Completed
        ));

        let late = store
            .update_document(&ws, &doc, DocumentUpdate::failed("late"))
            .await
            .unwrap();
        match late {
            UpdateOutcome::Unchanged(d) => {
                assert_eq!(d.status, DocumentStatus::Completed);
                assert_eq!(d.result_ref.as_deref(), Some("r1"));
                assert!(d.error.is_none());
            }
            other => panic!("expected Unchanged, got {:?}", other),
        }

        let missing = store
            .update_document(&ws, &"d9".into(), DocumentUpdate::processing())
            .await
            .unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_completion_marker_is_claimed_once_and_reset_by_append() {
        let store = store();
        let ws = workspace_with(&store, &["d1", "d2"]).await;
        let now = Utc::now();

        assert!(!store.mark_completion_notified(&ws, now).await.unwrap());

        for doc in ["d1", "d2"] {
            store
                .update_document(&ws, &doc.into(), DocumentUpdate::failed("x"))
                .await
                .unwrap();
        }
        assert!(store.mark_completion_notified(&ws, now).await.unwrap());
        assert!(!store.mark_completion_notified(&ws, now).await.unwrap());

        store
            .append_document(&ws, Document::pending_upload("d3".into(), "k", "x"))
            .await
            .unwrap();
        let workspace = store.get_workspace(&ws).await.unwrap().unwrap();
        assert!(workspace.completion_notified_at.is_none());
        assert!(!store.mark_completion_notified(&ws, now).await.unwrap());

        store
            .update_document(&ws, &"d3".into(), DocumentUpdate::completed(None, None))
            .await
            .unwrap();
        assert!(store.mark_completion_notified(&ws, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_workspace_is_never_ready() {
        let store = store();
        let ws = workspace_with(&store, &[]).await;
        assert!(!store.mark_completion_notified(&ws, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_payloads_load_in_requested_order_skipping_missing() {
        let store = store();
        let ws = workspace_with(&store, &["d1", "d2"]).await;

        let first = GraphPayload::new(ws.clone(), "d1".into(), "u1", graph("a"));
        let second = GraphPayload::new(ws.clone(), "d2".into(), "u1", graph("b"));
        store.put_payload(first.clone()).await.unwrap();
        store.put_payload(second.clone()).await.unwrap();

        let loaded = store
            .get_payloads(&[second.id.clone(), "ghost".into(), first.id.clone()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].graph_data, second.graph_data);
        assert_eq!(loaded[1].document_id, DocumentId::from("d1"));

        assert!(store.delete_payload(&first.id).await.unwrap());
        assert!(!store.delete_payload(&first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_documents_and_payloads() {
        let store = store();
        let ws = workspace_with(&store, &["d1"]).await;
        let payload = GraphPayload::new(ws.clone(), "d1".into(), "u1", graph("a"));
        store.put_payload(payload.clone()).await.unwrap();

        assert!(store.delete_workspace(&ws).await.unwrap());
        assert!(store.get_workspace(&ws).await.unwrap().is_none());
        assert!(store.get_payloads(&[payload.id]).await.unwrap().is_empty());
        assert!(!store.delete_workspace(&ws).await.unwrap());

        let orphans: i64 = store
            .pool()
            .run(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_find_stale_documents_uses_cutoff() {
        let store = store();
        let ws = workspace_with(&store, &["d1", "d2"]).await;
        store
            .update_document(&ws, &"d2".into(), DocumentUpdate::completed(None, None))
            .await
            .unwrap();

        assert!(store
            .find_stale_documents(Utc::now() - Duration::minutes(1))
            .await
            .unwrap()
            .is_empty());

        let stale = store
            .find_stale_documents(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].document_id, DocumentId::from("d1"));
        assert_eq!(stale[0].owner_id, "u1");
        assert_eq!(stale[0].status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_workspaces_filters_by_owner() {
        let store = store();
        let a = workspace_with(&store, &["d1"]).await;
        let b = workspace_with(&store, &[]).await;
        store
            .insert_workspace(Workspace::new("someone-else", "theirs"))
            .await
            .unwrap();

        let listed = store.list_workspaces("u1").await.unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        let ids: Vec<WorkspaceId> = listed.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, expected);
    }
}
