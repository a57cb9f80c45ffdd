//! Shared handle to the metadata database
//!
//! rusqlite is synchronous, so the store never touches the connection from an
//! async task directly. [`SqlitePool::run`] locks it on tokio's blocking pool
//! and hands the closure a `&mut Connection` for transactions.

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::schema;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info};

/// One serialized connection shared by every store clone
///
/// SQLite allows a single writer; readers and writers alike queue on the
/// mutex, and `busy_timeout` covers other processes holding the file.
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    config: Arc<SqliteConfig>,
}

impl SqlitePool {
    /// Open the database, configure it and apply pending migrations
    pub fn new(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = open(&config)?;
        apply_pragmas(&conn, &config)?;
        schema::apply_migrations(&conn)?;

        info!(
            path = ?config.path,
            wal = config.wal_mode,
            "Metadata database ready"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        })
    }

    /// Private in-memory database, used by tests and `--memory` runs
    pub fn memory() -> SqliteResult<Self> {
        Self::new(SqliteConfig::memory())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` with the connection locked, off the async runtime
    pub async fn run<F, T>(&self, f: F) -> SqliteResult<T>
    where
        F: FnOnce(&mut Connection) -> SqliteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .map_err(|e| SqliteError::Task(e.to_string()))?
    }
}

fn open(config: &SqliteConfig) -> SqliteResult<Connection> {
    if config.is_memory() {
        debug!("Opening in-memory database");
        return Ok(Connection::open_in_memory()?);
    }

    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            SqliteError::Connection(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    debug!(path = ?config.path, "Opening database file");
    Ok(Connection::open(&config.path)?)
}

fn apply_pragmas(conn: &Connection, config: &SqliteConfig) -> SqliteResult<()> {
    let mut pragmas = format!(
        "PRAGMA busy_timeout = {}; PRAGMA cache_size = {}; PRAGMA temp_store = MEMORY;",
        config.busy_timeout_ms, config.cache_size
    );
    if config.wal_mode && !config.is_memory() {
        pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    }
    // Document rows cascade from their workspace
    if config.foreign_keys {
        pragmas.push_str(" PRAGMA foreign_keys = ON;");
    }
    conn.execute_batch(&pragmas)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tempfile::TempDir;

    async fn pragma(pool: &SqlitePool, name: &'static str) -> String {
        pool.run(move |conn| {
            let sql = format!("PRAGMA {};", name);
            Ok(conn.query_row(&sql, [], |row| row.get::<_, rusqlite::types::Value>(0))?)
        })
        .await
        .map(|value| match value {
            rusqlite::types::Value::Integer(i) => i.to_string(),
            rusqlite::types::Value::Text(s) => s.to_lowercase(),
            other => format!("{:?}", other),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_database_uses_wal_and_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("assay.db");

        let pool = SqlitePool::new(SqliteConfig::new(&db_path)).unwrap();
        assert!(db_path.exists());

        assert_eq!(pragma(&pool, "journal_mode").await, "wal");
        assert_eq!(pragma(&pool, "foreign_keys").await, "1");
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema_version() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("assay.db");

        drop(SqlitePool::new(SqliteConfig::new(&db_path)).unwrap());
        let pool = SqlitePool::new(SqliteConfig::new(&db_path)).unwrap();

        let applied: i64 = pool
            .run(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_share_one_connection() {
        let pool = SqlitePool::memory().unwrap();
        pool.run(|conn| Ok(conn.execute_batch("CREATE TABLE hits (n INTEGER NOT NULL);")?))
            .await
            .unwrap();

        let writes = (0..16).map(|n| {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(move |conn| Ok(conn.execute("INSERT INTO hits (n) VALUES (?1)", [n])?))
                    .await
            })
        });
        for joined in join_all(writes).await {
            assert_eq!(joined.unwrap().unwrap(), 1);
        }

        let count: i64 = pool
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 16);
    }

    #[tokio::test]
    async fn test_run_surfaces_statement_errors() {
        let pool = SqlitePool::memory().unwrap();

        let err = pool
            .run(|conn| Ok(conn.execute_batch("SELECT * FROM missing_table;")?))
            .await
            .unwrap_err();
        assert!(matches!(err, SqliteError::Rusqlite(_)));
    }
}
