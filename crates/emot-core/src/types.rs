//! Shared data types for emot-core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(Error::invalid_input(format!(
                "role must be 'user' or 'assistant', got '{}'",
                other
            ))),
        }
    }
}

/// A single persisted conversation message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub emotion: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Per-session bookkeeping kept in the session directory.
///
/// `message_count` is best-effort: it is bumped after the message write and
/// is not transactional with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
}

impl SessionMetadata {
    /// Fresh metadata for a session created at `now`.
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }
}

/// Aggregate statistics across both storage tiers and the session directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub total_messages: u64,
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Sessions whose metadata was removed.
    pub sessions: usize,
    /// Messages removed across both tiers.
    pub messages: usize,
}

/// Row and session counts reported by a single storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub messages: u64,
    pub sessions: u64,
}
