//! Sweeper - periodic session eviction and audio cache cleanup
//!
//! One background task runs [`Sweeper::sweep_once`] every
//! `cleanup_interval_secs`. A failed sweep is logged and retried on the next
//! tick.

use chrono::{DateTime, Utc};
use emot_core::session::SessionManager;
use emot_core::voice::VoiceService;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub evicted_sessions: usize,
    pub evicted_messages: usize,
    pub audio_files_removed: usize,
    pub errors: Vec<String>,
}

pub struct Sweeper {
    sessions: Arc<SessionManager>,
    voice: Arc<VoiceService>,
    period: Duration,
    /// Handle of the running task, if any
    task: RwLock<Option<tokio::task::AbortHandle>>,
    /// Lock for starting/stopping operations
    operation_lock: Mutex<()>,
}

impl Sweeper {
    pub fn new(sessions: Arc<SessionManager>, voice: Arc<VoiceService>, period: Duration) -> Self {
        Self {
            sessions,
            voice,
            period,
            task: RwLock::new(None),
            operation_lock: Mutex::new(()),
        }
    }

    /// Evict expired sessions and drop stale cached audio.
    ///
    /// Both halves run even if the other fails; failures are collected in
    /// `errors`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepResult {
        let mut result = SweepResult::default();

        match self.sessions.evict_expired(now).await {
            Ok(report) => {
                result.evicted_sessions = report.sessions;
                result.evicted_messages = report.messages;
            }
            Err(e) => {
                error!(error = %e, "Session eviction failed");
                result.errors.push(format!("eviction: {}", e));
            }
        }

        match self.voice.cleanup_cache().await {
            Ok(removed) => result.audio_files_removed = removed,
            Err(e) => {
                error!(error = %e, "Audio cache cleanup failed");
                result.errors.push(format!("audio cache: {}", e));
            }
        }

        debug!(
            sessions = result.evicted_sessions,
            messages = result.evicted_messages,
            audio_files = result.audio_files_removed,
            "Sweep finished"
        );
        result
    }

    /// Start the periodic sweep, replacing a running one.
    pub async fn start(self: Arc<Self>) {
        let _lock = self.operation_lock.lock().await;
        self.stop_inner().await;

        info!(interval_secs = self.period.as_secs(), "Starting sweeper");

        let service = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(service.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; sweep one period after start.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                service.sweep_once(Utc::now()).await;
            }
        });

        *self.task.write().await = Some(handle.abort_handle());
    }

    async fn stop_inner(&self) {
        if let Some(handle) = self.task.write().await.take() {
            handle.abort();
            info!("Stopped sweeper");
        }
    }

    pub async fn stop(&self) {
        let _lock = self.operation_lock.lock().await;
        self.stop_inner().await;
    }

    pub async fn is_running(&self) -> bool {
        self.task.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::TestApp;
    use emot_core::Role;

    fn sweeper(app: &TestApp, period: Duration) -> Arc<Sweeper> {
        Arc::new(Sweeper::new(
            app.state.sessions.clone(),
            app.state.voice.clone(),
            period,
        ))
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_sessions() {
        let app = TestApp::new();
        let sessions = &app.state.sessions;
        let session_id = sessions.create_session().await;
        sessions
            .append_message(&session_id, Role::User, "hello", None)
            .await
            .unwrap();

        let sweeper = sweeper(&app, Duration::from_secs(300));

        let result = sweeper.sweep_once(Utc::now()).await;
        assert_eq!(result.evicted_sessions, 0);
        assert!(result.errors.is_empty());
        assert!(sessions.session_exists(&session_id).await.unwrap());

        let later = Utc::now() + sessions.session_timeout() + chrono::Duration::seconds(1);
        let result = sweeper.sweep_once(later).await;
        assert_eq!(result.evicted_sessions, 1);
        assert_eq!(result.evicted_messages, 1);
        assert!(!sessions.session_exists(&session_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let app = TestApp::new();
        let sweeper = sweeper(&app, Duration::from_millis(20));

        assert!(!sweeper.is_running().await);
        sweeper.clone().start().await;
        assert!(sweeper.is_running().await);

        // Restarting replaces the running task.
        sweeper.clone().start().await;
        assert!(sweeper.is_running().await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        sweeper.stop().await;
        assert!(!sweeper.is_running().await);
    }
}
