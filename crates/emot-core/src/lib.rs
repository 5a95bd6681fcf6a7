//! emot-core - Core library for Emot
//!
//! This crate holds everything behind the Emot HTTP server:
//!
//! - **db**: SQLite message store (primary tier)
//! - **store**: storage contract, JSON file fallback, tiered store with circuit breaker
//! - **session**: session metadata, history, eviction and stats
//! - **prompt**: bounded prompt windowing with emotional context
//! - **providers**: chat, transcription and synthesis traits (+ HTTP clients)
//! - **chat**: one chat turn end to end
//! - **voice**: transcription, synthesis and the audio cache

pub mod chat;
pub mod config;
pub mod db;
pub mod emotion;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod session;
pub mod store;
pub mod types;
pub mod voice;

// Re-export commonly used types
pub use chat::{ChatReply, ChatService};
pub use config::{LlmConfig, SessionConfig, VoiceConfig};
pub use db::Database;
pub use emotion::Emotion;
pub use error::{Error, ErrorKind, Result};
pub use session::SessionManager;
pub use types::{EvictionReport, Message, Role, SessionMetadata, SessionStats};
pub use voice::VoiceService;
