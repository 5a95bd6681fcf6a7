//! Two-tier storage with an explicit circuit breaker.
//!
//! ```text
//! append ──► breaker allows? ──yes──► primary (timeout) ──ok──► done
//!                 │                        │ err / timeout
//!                 no                       ▼
//!                 └──────────────────► fallback (timeout) ──err──► StorageUnavailable
//! ```
//!
//! Reads consult both tiers and merge by timestamp, so a session that was
//! written to the fallback during an outage still reads back completely once
//! the primary recovers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::MessageStore;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{Message, Role, StoreCounts};

/// Which tier served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Primary is used normally.
    Closed,
    /// Primary is skipped until the cooldown elapses.
    Open,
    /// Cooldown elapsed; the next call probes the primary.
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the in-flight half-open call.
    trial_started: Option<Instant>,
}

/// Consecutive-failure circuit breaker guarding the primary tier.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // The guarded state is plain counters and instants; a panic mid-update cannot
        // leave it inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(opened) if opened.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Whether the primary may be called right now.
    ///
    /// While half-open only one caller is admitted. A call that
    /// never reports back is replaced after another cooldown.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        let Some(opened) = inner.opened_at else {
            return true;
        };
        if opened.elapsed() < self.cooldown {
            return false;
        }
        match inner.trial_started {
            Some(started) if started.elapsed() < self.cooldown => false,
            _ => {
                inner.trial_started = Some(Instant::now());
                true
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.opened_at.is_some() {
            info!("Primary store recovered, closing circuit");
        }
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_started = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.trial_started = None;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.consecutive_failures >= self.threshold {
            if inner.opened_at.is_none() {
                warn!(
                    failures = inner.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Opening circuit for primary store"
                );
            }
            // A failed half-open probe restarts the cooldown.
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// Primary + fallback message stores behind one handle.
pub struct TieredStore {
    primary: Arc<dyn MessageStore>,
    fallback: Arc<dyn MessageStore>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl TieredStore {
    pub fn new(
        primary: Arc<dyn MessageStore>,
        fallback: Arc<dyn MessageStore>,
        breaker: CircuitBreaker,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            breaker,
            timeout,
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Run an operation against the primary, honoring and feeding the breaker.
    /// `None` when the breaker kept the call from being made.
    async fn try_primary<T>(&self, fut: impl Future<Output = Result<T>>) -> Option<Result<T>> {
        if !self.breaker.allow() {
            return None;
        }

        let result = self.with_timeout(fut).await;
        match &result {
            // The primary answered; a rejected input says nothing about its health.
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.kind() == ErrorKind::InvalidInput => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        Some(result)
    }

    async fn on_primary<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.try_primary(fut).await {
            Some(result) => result,
            None => Err(Error::StorageUnavailable(format!(
                "{} store circuit open",
                self.primary.name()
            ))),
        }
    }

    /// Probe the primary directly, bypassing the breaker.
    pub async fn ping_primary(&self) -> Result<()> {
        self.with_timeout(self.primary.ping()).await
    }

    /// Append to the primary, degrading to the fallback.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<(Message, Tier)> {
        let primary_err = match self
            .on_primary(self.primary.append(session_id, role, content, emotion))
            .await
        {
            Ok(message) => return Ok((message, Tier::Primary)),
            Err(e) => e,
        };

        warn!(
            session_id = %session_id,
            error = %primary_err,
            "Storage degraded: writing message to fallback store"
        );

        match self
            .with_timeout(self.fallback.append(session_id, role, content, emotion))
            .await
        {
            Ok(message) => Ok((message, Tier::Fallback)),
            Err(fallback_err) => {
                error!(
                    session_id = %session_id,
                    primary_error = %primary_err,
                    fallback_error = %fallback_err,
                    "All storage tiers failed to append message"
                );
                Err(Error::StorageUnavailable(format!(
                    "primary: {}; fallback: {}",
                    primary_err, fallback_err
                )))
            }
        }
    }

    /// The most recent `limit` messages across both tiers, oldest first.
    pub async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let primary = self.on_primary(self.primary.recent(session_id, limit)).await;
        let fallback = self
            .with_timeout(self.fallback.recent(session_id, limit))
            .await;

        let mut merged = match (primary, fallback) {
            (Ok(primary), Ok(fallback)) => {
                if primary.is_empty() && !fallback.is_empty() {
                    debug!(session_id = %session_id, "History served from fallback store");
                }
                merge_by_timestamp(primary, fallback)
            }
            (Ok(primary), Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Fallback store read failed");
                primary
            }
            (Err(e), Ok(fallback)) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Storage degraded: reading history from fallback store"
                );
                fallback
            }
            (Err(primary_err), Err(fallback_err)) => {
                error!(
                    session_id = %session_id,
                    primary_error = %primary_err,
                    fallback_error = %fallback_err,
                    "All storage tiers failed to read history"
                );
                return Err(Error::StorageUnavailable(format!(
                    "primary: {}; fallback: {}",
                    primary_err, fallback_err
                )));
            }
        };

        if merged.len() > limit {
            merged.drain(..merged.len() - limit);
        }
        Ok(merged)
    }

    /// Delete messages older than `cutoff` from both tiers.
    ///
    /// An open breaker skips the primary; any other tier failure fails the
    /// call so the sweep can be retried.
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut deleted = 0;
        match self.try_primary(self.primary.delete_before(cutoff)).await {
            Some(result) => deleted += result?,
            None => warn!("Primary store circuit open, skipping primary message sweep"),
        }
        deleted += self
            .with_timeout(self.fallback.delete_before(cutoff))
            .await?;
        Ok(deleted)
    }

    /// Delete one session's messages from both tiers.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let mut deleted = 0;
        match self
            .try_primary(self.primary.delete_session(session_id))
            .await
        {
            Some(result) => deleted += result?,
            None => {
                warn!(session_id = %session_id, "Primary store circuit open, skipping primary delete")
            }
        }
        deleted += self
            .with_timeout(self.fallback.delete_session(session_id))
            .await?;
        Ok(deleted)
    }

    /// Totals across both tiers. Messages are summed; sessions are the
    /// distinct ids held by either tier. A failing tier contributes nothing.
    pub async fn counts(&self) -> StoreCounts {
        let primary = self
            .on_primary(self.primary.counts())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Primary store counts unavailable");
                StoreCounts::default()
            });
        let fallback = self
            .with_timeout(self.fallback.counts())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Fallback store counts unavailable");
                StoreCounts::default()
            });

        let mut sessions = HashSet::new();
        match self.on_primary(self.primary.session_ids()).await {
            Ok(ids) => sessions.extend(ids),
            Err(e) => warn!(error = %e, "Primary store session ids unavailable"),
        }
        match self.with_timeout(self.fallback.session_ids()).await {
            Ok(ids) => sessions.extend(ids),
            Err(e) => warn!(error = %e, "Fallback store session ids unavailable"),
        }

        StoreCounts {
            messages: primary.messages + fallback.messages,
            sessions: sessions.len() as u64,
        }
    }
}

/// Stable merge of two timestamp-ordered sequences; primary wins ties.
fn merge_by_timestamp(primary: Vec<Message>, fallback: Vec<Message>) -> Vec<Message> {
    if fallback.is_empty() {
        return primary;
    }
    if primary.is_empty() {
        return fallback;
    }

    let mut merged = Vec::with_capacity(primary.len() + fallback.len());
    let mut a = primary.into_iter().peekable();
    let mut b = fallback.into_iter().peekable();
    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x.timestamp <= y.timestamp,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { a.next() } else { b.next() };
        merged.extend(next);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::testing::UnavailableStore;
    use crate::store::FileMessageStore;
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;

    /// A primary that never answers.
    struct HangingStore;

    #[async_trait]
    impl MessageStore for HangingStore {
        fn name(&self) -> &'static str {
            "hanging"
        }
        async fn append(&self, _: &str, _: Role, _: &str, _: Option<&str>) -> Result<Message> {
            std::future::pending().await
        }
        async fn recent(&self, _: &str, _: usize) -> Result<Vec<Message>> {
            std::future::pending().await
        }
        async fn delete_before(&self, _: DateTime<Utc>) -> Result<usize> {
            std::future::pending().await
        }
        async fn delete_session(&self, _: &str) -> Result<usize> {
            std::future::pending().await
        }
        async fn session_ids(&self) -> Result<Vec<String>> {
            std::future::pending().await
        }
        async fn counts(&self) -> Result<StoreCounts> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<()> {
            std::future::pending().await
        }
    }

    fn tiered(primary: Arc<dyn MessageStore>, dir: &std::path::Path) -> TieredStore {
        TieredStore::new(
            primary,
            Arc::new(FileMessageStore::new(dir, 50)),
            CircuitBreaker::new(3, Duration::from_secs(30)),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_breaker_half_opens_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow());
    }

    #[test]
    fn test_half_open_admits_a_single_caller() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));
        breaker.record_failure();
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow());
        assert!(!breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
        assert!(breaker.allow());
    }

    #[test]
    fn test_failed_half_open_call_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[tokio::test]
    async fn test_append_uses_primary_when_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let store = tiered(Arc::new(Database::open_in_memory().unwrap()), dir.path());

        let (_, tier) = store.append("s1", Role::User, "hi", None).await.unwrap();
        assert_eq!(tier, Tier::Primary);
        assert!(!dir.path().join("s1_messages.json").exists());
    }

    #[tokio::test]
    async fn test_append_falls_back_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = tiered(Arc::new(UnavailableStore::new()), dir.path());

        let (written, tier) = store
            .append("s1", Role::User, "still works", Some("neutral"))
            .await
            .unwrap();
        assert_eq!(tier, Tier::Fallback);

        let history = store.recent("s1", 50).await.unwrap();
        assert_eq!(history, vec![written]);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_primary() {
        let dir = tempfile::tempdir().unwrap();
        let primary = Arc::new(UnavailableStore::new());
        let store = tiered(primary.clone(), dir.path());

        for i in 0..5 {
            store
                .append("s1", Role::User, &format!("m{}", i), None)
                .await
                .unwrap();
        }
        assert_eq!(store.breaker_state(), BreakerState::Open);
        // Three failures opened the breaker; the remaining appends never hit the primary.
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hanging_primary_times_out_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store = tiered(Arc::new(HangingStore), dir.path());

        let (_, tier) = store.append("s1", Role::User, "hello", None).await.unwrap();
        assert_eq!(tier, Tier::Fallback);
    }

    #[tokio::test]
    async fn test_recent_merges_tiers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let file = Arc::new(FileMessageStore::new(dir.path(), 50));

        let tick = || tokio::time::sleep(Duration::from_millis(5));
        db.append("s1", Role::User, "first", None).await.unwrap();
        tick().await;
        file.append("s1", Role::Assistant, "second", None)
            .await
            .unwrap();
        tick().await;
        db.append("s1", Role::User, "third", None).await.unwrap();

        let store = TieredStore::new(
            db,
            file,
            CircuitBreaker::new(3, Duration::from_secs(30)),
            Duration::from_millis(500),
        );
        let history = store.recent("s1", 50).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);

        let window = store.recent("s1", 2).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].content, "third");
    }

    #[tokio::test]
    async fn test_counts_session_in_both_tiers_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let file = Arc::new(FileMessageStore::new(dir.path(), 50));

        file.append("s1", Role::User, "during outage", None)
            .await
            .unwrap();
        db.append("s1", Role::Assistant, "after recovery", None)
            .await
            .unwrap();
        db.append("s2", Role::User, "other", None).await.unwrap();

        let store = TieredStore::new(
            db,
            file,
            CircuitBreaker::new(3, Duration::from_secs(30)),
            Duration::from_millis(500),
        );
        let counts = store.counts().await;
        assert_eq!(counts.messages, 3);
        assert_eq!(counts.sessions, 2);
    }

    #[tokio::test]
    async fn test_sweep_fails_when_primary_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = tiered(Arc::new(UnavailableStore::new()), dir.path());
        assert!(store.delete_before(Utc::now()).await.is_err());
    }
}
