//! Message storage tiers.
//!
//! Two backends implement the same [`MessageStore`] contract:
//!
//! - [`crate::db::Database`]: durable SQLite table (primary)
//! - [`FileMessageStore`]: per-session JSON files (fallback)
//!
//! [`TieredStore`] puts them behind one handle with a circuit breaker and
//! per-call timeouts.

mod file;
mod tiered;

#[cfg(test)]
pub(crate) mod testing;

pub use file::FileMessageStore;
pub use tiered::{BreakerState, CircuitBreaker, Tier, TieredStore};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};
use crate::types::{Message, Role, StoreCounts};

/// Append-only message storage keyed by session.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Append a message. The stored timestamp is never earlier than the
    /// newest message already held for the session.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<Message>;

    /// The most recent `limit` messages of a session, oldest first.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Delete every message older than `cutoff`. Returns the number removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Delete all messages of one session. Returns the number removed.
    async fn delete_session(&self, session_id: &str) -> Result<usize>;

    /// Ids of every session with at least one stored message.
    async fn session_ids(&self) -> Result<Vec<String>>;

    /// Message and distinct-session counts.
    async fn counts(&self) -> Result<StoreCounts>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Session ids end up in file names and cache keys; keep them to a safe
/// alphabet.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(Error::invalid_input("session_id is required"));
    }
    if session_id.len() > 128
        || !session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::invalid_input(format!(
            "session_id contains unsupported characters: {}",
            session_id
        )));
    }
    Ok(())
}

/// Timestamp for a new message given the newest one already stored.
///
/// Millisecond precision, matching what the SQLite tier persists.
pub(crate) fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(3);
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}
