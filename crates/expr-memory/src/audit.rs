use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{MemoryError, MemoryResult};
use crate::types::AuditEntry;

/// Append-only record of exchanged messages. Never read on the request path.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn init(&self) -> MemoryResult<()>;
    async fn append(&self, entries: Vec<AuditEntry>) -> MemoryResult<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    db_path: PathBuf,
}

impl SqliteAuditLog {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    async fn with_connection<T, F>(&self, func: F) -> MemoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> MemoryResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        })
        .await
        .map_err(|error| MemoryError::Task(error.to_string()))?
    }

    /// Number of rows recorded for one session.
    pub async fn count(&self, session_id: &str) -> MemoryResult<u64> {
        let session_id = session_id.to_string();
        self.with_connection(move |connection| {
            let count: i64 = connection.query_row(
                "SELECT COUNT(*) FROM audit_entries WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Rows for one session in insertion order.
    pub async fn entries(&self, session_id: &str) -> MemoryResult<Vec<(String, String, DateTime<Utc>)>> {
        let session_id = session_id.to_string();
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(
                "SELECT role, content, created_at FROM audit_entries
                 WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = statement.query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (role, content, created_at) = row?;
                entries.push((role, content, parse_timestamp(created_at)?));
            }
            Ok(entries)
        })
        .await
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn init(&self) -> MemoryResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS audit_entries (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    entry_id TEXT NOT NULL UNIQUE,
                    session_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_entries(session_id);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn append(&self, entries: Vec<AuditEntry>) -> MemoryResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            {
                let mut statement = tx.prepare(
                    "INSERT INTO audit_entries (entry_id, session_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for entry in &entries {
                    statement.execute(params![
                        entry.entry_id,
                        entry.session_id,
                        entry.role.as_str(),
                        entry.content,
                        format_timestamp(entry.created_at),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

fn open_connection(path: &Path) -> MemoryResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn parse_timestamp(raw: String) -> MemoryResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}
