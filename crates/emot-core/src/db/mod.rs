//! Durable SQLite message store.
//!
//! One append-only `messages` table keyed by session. Each unit of work runs
//! on the blocking pool with the connection locked for its duration, so a
//! slow disk or a busy database never stalls an async worker and callers can
//! time out on it. SQLite's own `busy_timeout` bounds lock waits inside the
//! engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::store::{next_timestamp, MessageStore};
use crate::types::{Message, Role, StoreCounts};

const SCHEMA: &str = include_str!("./migrations/001_messages.sql");

/// Default wait for a locked database file.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock
/// on a blocking thread.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at a specific path.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        let db = Self::from_connection(conn, DEFAULT_BUSY_TIMEOUT)?;
        info!(path = %path.display(), "Database initialized");
        Ok(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::from_connection(conn, DEFAULT_BUSY_TIMEOUT)
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run one unit of work against the connection on the blocking pool.
    async fn run_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| Error::LockPoisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("database task failed: {}", e)))?
    }

    fn map_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        let role: String = row.get(1)?;
        let role = role
            .parse::<Role>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        let millis: i64 = row.get(4)?;

        Ok(Message {
            session_id: row.get(0)?,
            role,
            content: row.get(2)?,
            emotion: row.get(3)?,
            timestamp: millis_to_datetime(millis, 4)?,
        })
    }
}

fn millis_to_datetime(millis: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(
        column, millis,
    ))
}

#[async_trait]
impl MessageStore for Database {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<Message> {
        let session_id = session_id.to_string();
        let content = content.to_string();
        let emotion = emotion.map(String::from);

        self.run_blocking(move |conn| {
            let last: Option<i64> = conn
                .query_row(
                    "SELECT MAX(timestamp) FROM messages WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            let last = last.map(|ms| millis_to_datetime(ms, 0)).transpose()?;
            let timestamp = next_timestamp(last);

            conn.execute(
                "INSERT INTO messages (session_id, role, content, emotion, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id,
                    role.as_str(),
                    content,
                    emotion,
                    timestamp.timestamp_millis(),
                ],
            )?;

            Ok(Message {
                session_id,
                role,
                content,
                emotion,
                timestamp,
            })
        })
        .await
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, role, content, emotion, timestamp FROM (
                     SELECT id, session_id, role, content, emotion, timestamp
                     FROM messages
                     WHERE session_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2
                 )
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let messages = stmt
                .query_map(params![session_id, limit as i64], Self::map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.run_blocking(move |conn| {
            Ok(conn.execute(
                "DELETE FROM messages WHERE timestamp < ?1",
                params![cutoff.timestamp_millis()],
            )?)
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            Ok(conn.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id],
            )?)
        })
        .await
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT session_id FROM messages")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        self.run_blocking(|conn| {
            let (messages, sessions): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT session_id) FROM messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(StoreCounts {
                messages: messages as u64,
                sessions: sessions as u64,
            })
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.run_blocking(|conn| Ok(conn.query_row("SELECT 1", [], |_| Ok(()))?))
            .await
    }
}
