//! Bounded in-process history cache.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::Message;

/// Per-session history snapshots, capped at `capacity` sessions.
///
/// When full, an arbitrary entry is dropped to make room. Callers invalidate
/// a session on every append. Every invalidation bumps a version; a snapshot
/// read before the bump is refused by [`HistoryCache::insert`].
#[derive(Debug)]
pub(crate) struct HistoryCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    version: u64,
    entries: HashMap<String, Vec<Message>>,
}

impl HistoryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheInner>> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }

    pub(crate) fn get(&self, session_id: &str) -> Result<Option<Vec<Message>>> {
        Ok(self.lock()?.entries.get(session_id).cloned())
    }

    /// Current version. Take it before reading the history to be cached.
    pub(crate) fn version(&self) -> Result<u64> {
        Ok(self.lock()?.version)
    }

    /// Cache `history` if nothing was invalidated since `seen_version`.
    /// Returns whether the snapshot was kept.
    pub(crate) fn insert(
        &self,
        session_id: &str,
        history: Vec<Message>,
        seen_version: u64,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.version != seen_version {
            return Ok(false);
        }
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(session_id) {
            if let Some(victim) = inner.entries.keys().next().cloned() {
                inner.entries.remove(&victim);
            }
        }
        inner.entries.insert(session_id.to_string(), history);
        Ok(true)
    }

    pub(crate) fn invalidate(&self, session_id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.version = inner.version.wrapping_add(1);
        inner.entries.remove(session_id);
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.version = inner.version.wrapping_add(1);
        inner.entries.clear();
        Ok(())
    }
}
