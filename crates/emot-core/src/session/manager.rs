//! Session manager: the one entry point for session state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cache::HistoryCache;
use super::directory::SessionDirectory;
use crate::config::SessionConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::store::{
    validate_session_id, BreakerState, CircuitBreaker, FileMessageStore, MessageStore, Tier,
    TieredStore,
};
use crate::types::{EvictionReport, Message, Role, SessionMetadata, SessionStats};

/// Creates sessions, appends and reads history, evicts stale sessions.
pub struct SessionManager {
    store: TieredStore,
    directory: SessionDirectory,
    cache: Option<HistoryCache>,
    max_history: usize,
    session_timeout: chrono::Duration,
    sweep_lock: Mutex<()>,
}

impl SessionManager {
    /// Open the SQLite primary at `config.database_path` and build the manager.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let db = Database::open_path(&config.database_path)?;
        Ok(Self::new(Arc::new(db), config))
    }

    /// Build a manager over an arbitrary primary store. The fallback store and
    /// metadata live in `config.sessions_dir`.
    pub fn new(primary: Arc<dyn MessageStore>, config: &SessionConfig) -> Self {
        let fallback = Arc::new(FileMessageStore::new(
            &config.sessions_dir,
            config.max_history,
        ));
        let breaker = CircuitBreaker::new(
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_cooldown_secs),
        );
        let cache =
            (config.history_cache_capacity > 0).then(|| HistoryCache::new(config.history_cache_capacity));

        Self {
            store: TieredStore::new(primary, fallback, breaker, config.store_timeout()),
            directory: SessionDirectory::new(&config.sessions_dir),
            cache,
            max_history: config.max_history,
            session_timeout: config.session_timeout(),
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.store.breaker_state()
    }

    /// Probe the primary store directly.
    pub async fn ping_primary(&self) -> Result<()> {
        self.store.ping_primary().await
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        self.session_timeout
    }

    fn invalidate(&self, session_id: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate(session_id) {
                warn!(session_id = %session_id, error = %e, "Failed to invalidate history cache");
            }
        }
    }

    /// Start a new session and return its id.
    ///
    /// A failed metadata write is logged; the id is still usable since the
    /// first append recreates the metadata.
    pub async fn create_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        match self.directory.create(&session_id, Utc::now()).await {
            Ok(_) => info!(session_id = %session_id, "Created new session"),
            Err(e) => warn!(
                session_id = %session_id,
                error = %e,
                "Storage degraded: session metadata not written"
            ),
        }
        session_id
    }

    /// Append a message to a session.
    ///
    /// Returns `Ok(false)` when every storage tier rejected the write.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<bool> {
        validate_session_id(session_id)?;
        if content.trim().is_empty() {
            return Err(Error::invalid_input("message content is required"));
        }

        let message = match self.store.append(session_id, role, content, emotion).await {
            Ok((message, tier)) => {
                if tier == Tier::Fallback {
                    debug!(session_id = %session_id, "Message stored in fallback tier");
                }
                message
            }
            Err(Error::StorageUnavailable(reason)) => {
                error!(session_id = %session_id, reason = %reason, "Message was not stored");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.invalidate(session_id);

        if let Err(e) = self
            .directory
            .record_activity(session_id, message.timestamp)
            .await
        {
            warn!(session_id = %session_id, error = %e, "Failed to update session metadata");
        }
        Ok(true)
    }

    /// The most recent `max_history` messages, oldest first.
    ///
    /// `NotFound` when the session has neither metadata nor messages.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<Message>> {
        validate_session_id(session_id)?;

        let mut seen_version = None;
        if let Some(cache) = &self.cache {
            match cache.get(session_id) {
                Ok(Some(history)) => return Ok(history),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "History cache unavailable"),
            }
            seen_version = cache.version().ok();
        }

        let history = self.store.recent(session_id, self.max_history).await?;
        if history.is_empty() && self.directory.get(session_id).await?.is_none() {
            return Err(Error::not_found("Session", session_id));
        }

        if let (Some(cache), Some(version)) = (&self.cache, seen_version) {
            match cache.insert(session_id, history.clone(), version) {
                Ok(true) => {}
                Ok(false) => debug!(session_id = %session_id, "History changed during read, not cached"),
                Err(e) => warn!(error = %e, "History cache unavailable"),
            }
        }
        Ok(history)
    }

    /// Whether the session has metadata or any stored message.
    pub async fn session_exists(&self, session_id: &str) -> Result<bool> {
        validate_session_id(session_id)?;
        if self.directory.get(session_id).await?.is_some() {
            return Ok(true);
        }
        Ok(!self.store.recent(session_id, 1).await?.is_empty())
    }

    pub async fn metadata(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        self.directory.get(session_id).await
    }

    /// Remove messages older than the session timeout, and every session whose
    /// last activity is older than it.
    ///
    /// Sweeps are serialized; a storage failure fails the sweep.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<EvictionReport> {
        let _guard = self.sweep_lock.lock().await;
        let cutoff = now - self.session_timeout;
        let mut report = EvictionReport::default();

        report.messages += self.store.delete_before(cutoff).await?;

        for metadata in self.directory.list().await? {
            if metadata.last_activity >= cutoff {
                continue;
            }
            report.messages += self.store.delete_session(&metadata.session_id).await?;
            self.directory.delete(&metadata.session_id).await?;
            report.sessions += 1;
            debug!(session_id = %metadata.session_id, "Evicted expired session");
        }

        if let Some(cache) = &self.cache {
            cache.clear()?;
        }

        if report.sessions > 0 || report.messages > 0 {
            info!(
                sessions = report.sessions,
                messages = report.messages,
                "Evicted expired sessions"
            );
        }
        Ok(report)
    }

    /// Aggregate statistics. Tiers that fail to report count as empty.
    pub async fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        let counts = self.store.counts().await;
        let sessions = self.directory.list().await.unwrap_or_else(|e| {
            warn!(error = %e, "Session metadata unavailable for stats");
            Vec::new()
        });

        let cutoff = now - self.session_timeout;
        SessionStats {
            total_sessions: counts.sessions.max(sessions.len() as u64),
            active_sessions: sessions
                .iter()
                .filter(|s| s.last_activity >= cutoff)
                .count() as u64,
            total_messages: counts.messages,
            oldest_session: sessions.iter().map(|s| s.created_at).min(),
            newest_session: sessions.iter().map(|s| s.created_at).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::UnavailableStore;
    use crate::types::StoreCounts;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;
    use tokio::sync::Notify;

    /// SQLite primary whose next `recent` call pauses until released.
    struct GatedStore {
        db: Database,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                db: Database::open_in_memory().unwrap(),
                armed: AtomicBool::new(false),
                reached: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl MessageStore for GatedStore {
        fn name(&self) -> &'static str {
            "gated"
        }
        async fn append(
            &self,
            session_id: &str,
            role: Role,
            content: &str,
            emotion: Option<&str>,
        ) -> Result<Message> {
            self.db.append(session_id, role, content, emotion).await
        }
        async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
            let history = self.db.recent(session_id, limit).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            Ok(history)
        }
        async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
            self.db.delete_before(cutoff).await
        }
        async fn delete_session(&self, session_id: &str) -> Result<usize> {
            self.db.delete_session(session_id).await
        }
        async fn session_ids(&self) -> Result<Vec<String>> {
            self.db.session_ids().await
        }
        async fn counts(&self) -> Result<StoreCounts> {
            self.db.counts().await
        }
        async fn ping(&self) -> Result<()> {
            self.db.ping().await
        }
    }

    fn manager_with(primary: Arc<dyn MessageStore>, dir: &Path) -> SessionManager {
        let mut config = SessionConfig::in_dir(dir);
        config.store_timeout_ms = 500;
        SessionManager::new(primary, &config)
    }

    fn manager(dir: &Path) -> SessionManager {
        manager_with(Arc::new(Database::open_in_memory().unwrap()), dir)
    }

    #[tokio::test]
    async fn test_sad_message_round_trip() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        let id = manager.create_session().await;
        let stored = manager
            .append_message(&id, Role::User, "I'm feeling a bit sad today", Some("sad"))
            .await
            .unwrap();
        assert!(stored);

        let history = manager.get_history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "I'm feeling a bit sad today");
        assert_eq!(history[0].emotion.as_deref(), Some("sad"));
        assert_eq!(history[0].session_id, id);
    }

    #[tokio::test]
    async fn test_append_then_history_returns_it_last() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let id = manager.create_session().await;

        let turns = [
            (Role::User, "hello"),
            (Role::Assistant, "Hi! How are you feeling?"),
            (Role::User, "  spaces and ünïcode 🙂  "),
        ];
        for (role, content) in turns {
            manager
                .append_message(&id, role, content, None)
                .await
                .unwrap();
            let history = manager.get_history(&id).await.unwrap();
            let last = history.last().unwrap();
            assert_eq!(last.role, role);
            assert_eq!(last.content, content);
            assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let id = manager.create_session().await;

        for i in 0..70 {
            manager
                .append_message(&id, Role::User, &format!("message {}", i), None)
                .await
                .unwrap();
        }

        let history = manager.get_history(&id).await.unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history.last().unwrap().content, "message 69");
    }

    #[tokio::test]
    async fn test_create_session_ids_are_distinct() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        let ids: HashSet<_> = [
            manager.create_session().await,
            manager.create_session().await,
        ]
        .into_iter()
        .collect();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_session_vs_unknown_session() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        let id = manager.create_session().await;
        assert!(manager.get_history(&id).await.unwrap().is_empty());
        assert!(manager.session_exists(&id).await.unwrap());

        let err = manager.get_history("no-such-session").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!manager.session_exists("no-such-session").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_without_metadata_creates_it() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        manager
            .append_message("client-chosen", Role::User, "hi", None)
            .await
            .unwrap();
        let metadata = manager.metadata("client-chosen").await.unwrap().unwrap();
        assert_eq!(metadata.message_count, 1);
    }

    #[tokio::test]
    async fn test_append_rejects_empty_input() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        let err = manager
            .append_message("", Role::User, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = manager
            .append_message("s1", Role::User, "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_fallback_round_trip_when_primary_unavailable() {
        let healthy_dir = tempdir().unwrap();
        let degraded_dir = tempdir().unwrap();
        let healthy = manager(healthy_dir.path());
        let degraded = manager_with(Arc::new(UnavailableStore::new()), degraded_dir.path());

        let mut observed = Vec::new();
        for manager in [&healthy, &degraded] {
            manager
                .append_message("s1", Role::User, "I'm feeling a bit sad today", Some("sad"))
                .await
                .unwrap();
            manager
                .append_message("s1", Role::Assistant, "I'm here for you.", Some("empathetic"))
                .await
                .unwrap();
            let history = manager.get_history("s1").await.unwrap();
            observed.push(
                history
                    .into_iter()
                    .map(|m| (m.role, m.content, m.emotion))
                    .collect::<Vec<_>>(),
            );
        }

        assert_eq!(observed[0], observed[1]);
        assert!(degraded_dir.path().join("sessions/s1_messages.json").exists());
    }

    #[tokio::test]
    async fn test_append_reports_false_when_all_tiers_fail() {
        let dir = tempdir().unwrap();
        // A regular file where the sessions directory should be makes every
        // fallback write fail.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "").unwrap();
        let manager = manager_with(Arc::new(UnavailableStore::new()), &blocked);

        let stored = manager
            .append_message("s1", Role::User, "lost", None)
            .await
            .unwrap();
        assert!(!stored);
    }

    #[tokio::test]
    async fn test_evict_expired_removes_only_stale_sessions() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let timeout = manager.session_timeout();

        let id = manager.create_session().await;
        manager
            .append_message(&id, Role::User, "hello", None)
            .await
            .unwrap();
        let last_activity = manager.metadata(&id).await.unwrap().unwrap().last_activity;

        // Just inside the window: untouched.
        let inside = last_activity + timeout - chrono::Duration::seconds(1);
        let report = manager.evict_expired(inside).await.unwrap();
        assert_eq!(report, EvictionReport::default());
        assert_eq!(manager.get_history(&id).await.unwrap().len(), 1);

        // Past the window: gone from both tiers and the directory.
        let outside = last_activity + timeout + chrono::Duration::seconds(1);
        let report = manager.evict_expired(outside).await.unwrap();
        assert_eq!(report.sessions, 1);
        assert_eq!(report.messages, 1);
        assert!(manager.get_history(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_evict_expired_clears_fallback_tier() {
        let dir = tempdir().unwrap();
        let manager = manager_with(Arc::new(UnavailableStore::new()), dir.path());
        let timeout = manager.session_timeout();

        manager
            .append_message("s1", Role::User, "hello", None)
            .await
            .unwrap();
        assert!(dir.path().join("sessions/s1_messages.json").exists());

        // Trip the breaker so the sweep skips the dead primary.
        for _ in 0..3 {
            manager
                .append_message("s2", Role::User, "x", None)
                .await
                .unwrap();
        }
        assert_eq!(manager.breaker_state(), BreakerState::Open);

        let later = Utc::now() + timeout + chrono::Duration::seconds(1);

        let report = manager.evict_expired(later).await.unwrap();
        assert_eq!(report.sessions, 2);
        assert!(!dir.path().join("sessions/s1_messages.json").exists());
        assert!(!dir.path().join("sessions/s1_metadata.json").exists());
    }

    #[tokio::test]
    async fn test_cache_is_invalidated_on_append() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let id = manager.create_session().await;

        manager
            .append_message(&id, Role::User, "first", None)
            .await
            .unwrap();
        assert_eq!(manager.get_history(&id).await.unwrap().len(), 1);

        manager
            .append_message(&id, Role::Assistant, "second", None)
            .await
            .unwrap();
        let history = manager.get_history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());

        let a = manager.create_session().await;
        let b = manager.create_session().await;
        let _empty = manager.create_session().await;
        manager.append_message(&a, Role::User, "1", None).await.unwrap();
        manager.append_message(&a, Role::Assistant, "2", None).await.unwrap();
        manager.append_message(&b, Role::User, "3", None).await.unwrap();

        let stats = manager.stats(Utc::now()).await;
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.active_sessions, 3);
        assert_eq!(stats.total_messages, 3);
        assert!(stats.oldest_session <= stats.newest_session);

        let later = Utc::now() + manager.session_timeout() + chrono::Duration::seconds(1);
        assert_eq!(manager.stats(later).await.active_sessions, 0);
    }

    #[tokio::test]
    async fn test_history_read_racing_an_append_is_not_cached() {
        let dir = tempdir().unwrap();
        let store = Arc::new(GatedStore::new());
        let manager = Arc::new(manager_with(store.clone(), dir.path()));
        let id = manager.create_session().await;
        manager
            .append_message(&id, Role::User, "first", None)
            .await
            .unwrap();

        // The read takes its snapshot, then stalls before caching it.
        store.armed.store(true, Ordering::SeqCst);
        let reader = {
            let manager = Arc::clone(&manager);
            let id = id.clone();
            tokio::spawn(async move { manager.get_history(&id).await })
        };
        store.reached.notified().await;

        manager
            .append_message(&id, Role::Assistant, "second", None)
            .await
            .unwrap();
        store.release.notify_one();

        let stale = reader.await.unwrap().unwrap();
        assert_eq!(stale.len(), 1);

        let history = manager.get_history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn test_stats_counts_session_in_both_tiers_once() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::in_dir(dir.path());
        let manager = manager(dir.path());

        // Written to the fallback during an outage, then to the primary after.
        let fallback = FileMessageStore::new(&config.sessions_dir, config.max_history);
        fallback
            .append("s1", Role::User, "during outage", None)
            .await
            .unwrap();
        manager
            .append_message("s1", Role::Assistant, "after recovery", None)
            .await
            .unwrap();

        let stats = manager.stats(Utc::now()).await;
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_messages, 2);
    }
}
