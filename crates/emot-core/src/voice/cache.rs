//! Content-addressed cache of synthesized audio.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

const AUDIO_EXTENSION: &str = "mp3";

/// Directory of `<sha256>.mp3` files.
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache filename for a synthesis request.
    pub fn filename_for(voice: &str, emotion: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(voice.as_bytes());
        hasher.update(b"|");
        hasher.update(emotion.as_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), AUDIO_EXTENSION)
    }

    /// Resolve a client-supplied filename, rejecting anything that is not a
    /// plain cache entry name.
    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let valid = !filename.is_empty()
            && filename.len() <= 128
            && !filename.starts_with('.')
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !filename.contains("..");
        if !valid {
            return Err(Error::not_found("Audio file", filename));
        }
        Ok(self.dir.join(filename))
    }

    pub async fn contains(&self, filename: &str) -> bool {
        match self.resolve(filename) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Write `audio` under `filename`. Readers see either no file or the
    /// complete one.
    pub async fn store(&self, filename: &str, audio: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(filename)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Dot-prefixed so `resolve` never serves a partial write.
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp, audio).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                debug!(path = %tmp.display(), error = %cleanup, "Temporary audio file not removed");
            }
            return Err(e.into());
        }
        debug!(filename = %filename, bytes = audio.len(), "Cached audio");
        Ok(path)
    }

    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.resolve(filename)?;
        match tokio::fs::read(&path).await {
            Ok(audio) => Ok(audio),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("Audio file", filename))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove files last modified more than `max_age` ago.
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove cached audio")
                }
            }
        }

        if removed > 0 {
            debug!(removed, "Cleaned up cached audio");
        }
        Ok(removed)
    }

    pub async fn file_count(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}
