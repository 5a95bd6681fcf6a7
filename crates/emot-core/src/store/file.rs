//! File-based fallback message store.
//!
//! Persists each session as `<dir>/<session_id>_messages.json`. Files are
//! capped at `max_history` messages (oldest dropped) and rewritten through a
//! temp file + rename so readers never see a half-written array.
//! Read-modify-write cycles are serialized per session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{next_timestamp, validate_session_id, MessageStore};
use crate::error::{Error, Result};
use crate::types::{Message, Role, StoreCounts};

const MESSAGES_SUFFIX: &str = "_messages.json";

/// Per-session JSON message files.
#[derive(Debug)]
pub struct FileMessageStore {
    dir: PathBuf,
    max_history: usize,
    /// One write lock per session file.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileMessageStore {
    pub fn new(dir: impl Into<PathBuf>, max_history: usize) -> Self {
        Self {
            dir: dir.into(),
            max_history,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(session_id.to_string()).or_default()))
    }

    /// Drop a session's lock once nobody else holds it.
    fn release_lock(&self, session_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(session_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(session_id);
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a session's message file.
    pub fn messages_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", session_id, MESSAGES_SUFFIX))
    }

    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let path = self.messages_path(session_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.messages_path(session_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(messages)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.messages_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Session ids that currently have a message file.
    /// Drop a session's messages older than `cutoff`. Caller holds its lock.
    async fn trim_session(&self, session_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut messages = match self.load(session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Skipping unreadable message file");
                return Ok(0);
            }
        };

        let before = messages.len();
        messages.retain(|m| m.timestamp >= cutoff);
        let removed = before - messages.len();
        if removed == 0 {
            return Ok(0);
        }

        if messages.is_empty() {
            self.remove(session_id).await?;
        } else {
            self.save(session_id, &messages).await?;
        }
        Ok(removed)
    }

    async fn list_session_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(MESSAGES_SUFFIX)) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<Message> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;

        let mut messages = self.load(session_id).await?;
        let message = Message {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            emotion: emotion.map(String::from),
            timestamp: next_timestamp(messages.last().map(|m| m.timestamp)),
        };
        messages.push(message.clone());

        if messages.len() > self.max_history {
            let excess = messages.len() - self.max_history;
            messages.drain(..excess);
        }

        self.save(session_id, &messages).await?;
        debug!(session_id = %session_id, role = %role, "Saved message to file store");
        Ok(message)
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        validate_session_id(session_id)?;
        let mut messages = self.load(session_id).await?;
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut deleted = 0;

        for session_id in self.list_session_ids().await? {
            let lock = self.session_lock(&session_id)?;
            let guard = lock.lock().await;
            let result = self.trim_session(&session_id, cutoff).await;
            drop(guard);
            drop(lock);
            self.release_lock(&session_id);
            deleted += result?;
        }

        Ok(deleted)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize> {
        validate_session_id(session_id)?;
        let lock = self.session_lock(session_id)?;
        let guard = lock.lock().await;
        let count = self.load(session_id).await.map(|m| m.len()).unwrap_or(0);
        self.remove(session_id).await?;

        drop(guard);
        drop(lock);
        self.release_lock(session_id);
        Ok(count)
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        self.list_session_ids().await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let mut counts = StoreCounts::default();
        for session_id in self.list_session_ids().await? {
            match self.load(&session_id).await {
                Ok(messages) if !messages.is_empty() => {
                    counts.messages += messages.len() as u64;
                    counts.sessions += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Skipping unreadable message file");
                }
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}
