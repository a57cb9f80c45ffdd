//! Schema management and migrations

use crate::error::{SqliteError, SqliteResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version < SCHEMA_VERSION {
        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Applying schema migrations"
        );
        apply_migration_v1(conn)?;
    }

    Ok(())
}

fn current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;

    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: workspaces, documents and graph payloads
fn apply_migration_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("Applying migration v1: ingestion schema");

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| SqliteError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    record_migration(conn, 1)?;
    info!("Migration v1 applied successfully");
    Ok(())
}

/// Initial schema SQL
///
/// Timestamps are RFC 3339 UTC strings with a fixed microsecond width, so
/// string comparison orders them chronologically.
const SCHEMA_V1: &str = r#"
-- ============================================================================
-- TABLE: workspaces
-- ============================================================================

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completion_notified_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_workspaces_owner ON workspaces(owner_id, id);

-- ============================================================================
-- TABLE: documents
-- ============================================================================
-- One row per ingestion job; `position` keeps registration order

CREATE TABLE IF NOT EXISTS documents (
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    position INTEGER NOT NULL,
    source_kind TEXT NOT NULL CHECK (source_kind IN ('file', 'note', 'conversation')),
    source_ref TEXT,
    source_id TEXT,
    display_name TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    result_ref TEXT,
    payload_ref TEXT,
    error TEXT,
    schema_hint TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (workspace_id, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_order ON documents(workspace_id, position);
CREATE INDEX IF NOT EXISTS idx_documents_stale ON documents(status, updated_at);

-- ============================================================================
-- TABLE: graph_payloads
-- ============================================================================
-- Extracted graphs, kept apart from document rows. No foreign key: a payload
-- may be written for a workspace that is deleted concurrently.

CREATE TABLE IF NOT EXISTS graph_payloads (
    id TEXT PRIMARY KEY NOT NULL,
    workspace_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    graph_data TEXT NOT NULL,  -- JSON
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_graph_payloads_workspace ON graph_payloads(workspace_id);
"#;
