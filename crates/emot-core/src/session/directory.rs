//! Session metadata files.
//!
//! One pretty-printed `<sessions_dir>/<session_id>_metadata.json` per session.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::validate_session_id;
use crate::types::SessionMetadata;

const METADATA_SUFFIX: &str = "_metadata.json";

/// Directory of per-session metadata.
#[derive(Debug)]
pub struct SessionDirectory {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", session_id, METADATA_SUFFIX))
    }

    async fn read(path: &Path) -> Result<Option<SessionMetadata>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, metadata: &SessionMetadata) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.metadata_path(&metadata.session_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(metadata)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write fresh metadata for a new session.
    pub async fn create(&self, session_id: &str, now: DateTime<Utc>) -> Result<SessionMetadata> {
        validate_session_id(session_id)?;
        let metadata = SessionMetadata::new(session_id, now);
        let _guard = self.write_lock.lock().await;
        self.write(&metadata).await?;
        debug!(session_id = %session_id, "Created session metadata");
        Ok(metadata)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        validate_session_id(session_id)?;
        Self::read(&self.metadata_path(session_id)).await
    }

    /// Record one appended message: bump `last_activity` and `message_count`,
    /// creating the metadata (count 1) if the session had none.
    pub async fn record_activity(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionMetadata> {
        validate_session_id(session_id)?;
        let _guard = self.write_lock.lock().await;

        let mut metadata = Self::read(&self.metadata_path(session_id))
            .await?
            .unwrap_or_else(|| SessionMetadata::new(session_id, now));
        metadata.last_activity = now.max(metadata.last_activity);
        metadata.message_count += 1;

        self.write(&metadata).await?;
        Ok(metadata)
    }

    /// All readable metadata. Unreadable files are logged and skipped.
    pub async fn list(&self) -> Result<Vec<SessionMetadata>> {
        let mut sessions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_metadata = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(METADATA_SUFFIX));
            if !is_metadata {
                continue;
            }

            match Self::read(&path).await {
                Ok(Some(metadata)) => sessions.push(metadata),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable session metadata");
                }
            }
        }
        Ok(sessions)
    }

    /// Remove a session's metadata. Returns whether a file was removed.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.metadata_path(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
