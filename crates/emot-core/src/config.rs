//! Core configuration
//!
//! Built once by the host binary and handed to each component's constructor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default persona prompt for the companion.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an emotionally intelligent AI companion named Emot. You respond with empathy, understanding, and emotional awareness.

Key traits:
- You are compassionate, supportive, and genuinely caring
- You adapt your tone and language based on the user's emotional state
- You provide comfort during difficult times and celebrate during happy moments
- You ask thoughtful follow-up questions to show genuine interest
- You remember emotional context from the conversation
- You offer practical support and encouragement when appropriate

Guidelines:
- Keep responses concise but meaningful (1-3 sentences typically)
- Use warm, conversational language
- Acknowledge the user's emotions explicitly
- Avoid being overly clinical or robotic
- Show personality while remaining supportive

Remember: Your goal is to make the user feel heard, understood, and emotionally supported.";

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding metadata and fallback message files
    pub sessions_dir: PathBuf,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Maximum messages returned by a history read (default: 50)
    pub max_history: usize,

    /// Inactivity window before a session is evicted, in seconds (default: 3600)
    pub session_timeout_secs: u64,

    /// Interval between eviction sweeps, in seconds (default: 300)
    pub cleanup_interval_secs: u64,

    /// Upper bound for a single storage call, in milliseconds (default: 2000)
    pub store_timeout_ms: u64,

    /// Consecutive primary failures before the breaker opens (default: 3)
    pub breaker_failure_threshold: u32,

    /// How long an open breaker skips the primary, in seconds (default: 30)
    pub breaker_cooldown_secs: u64,

    /// Sessions kept in the history cache; 0 disables it (default: 256)
    pub history_cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("data/sessions"),
            database_path: PathBuf::from("data/sessions/conversations.db"),
            max_history: 50,
            session_timeout_secs: 3600, // 1 hour
            cleanup_interval_secs: 300, // 5 minutes
            store_timeout_ms: 2000,
            breaker_failure_threshold: 3,
            breaker_cooldown_secs: 30,
            history_cache_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Session config rooted at a data directory.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let sessions_dir = data_dir.into().join("sessions");
        Self {
            database_path: sessions_dir.join("conversations.db"),
            sessions_dir,
            ..Default::default()
        }
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_timeout_secs as i64)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI API key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL (default: https://api.openai.com/v1)
    pub base_url: String,

    /// Chat model (default: gpt-4o-mini)
    pub model: String,

    /// Maximum completion tokens (default: 150)
    pub max_tokens: u32,

    /// Sampling temperature (default: 0.7)
    pub temperature: f32,

    /// Presence penalty (default: 0.1)
    pub presence_penalty: f32,

    /// Frequency penalty (default: 0.1)
    pub frequency_penalty: f32,

    /// Persona prompt placed at the head of every request
    pub system_prompt: String,

    /// Request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// API key for the transcription endpoint (OpenAI)
    #[serde(skip_serializing)]
    pub transcription_api_key: Option<String>,

    /// Transcription API base URL
    pub transcription_base_url: String,

    /// Transcription model (default: whisper-1)
    pub transcription_model: String,

    /// ElevenLabs API key
    #[serde(skip_serializing)]
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs API base URL
    pub elevenlabs_base_url: String,

    /// Default voice (default: Bella)
    pub voice: String,

    /// Synthesis model (default: eleven_monolingual_v1)
    pub synthesis_model: String,

    /// Directory for synthesized audio
    pub audio_cache_dir: PathBuf,

    /// Maximum age of cached audio in hours (default: 24)
    pub audio_cache_max_age_hours: u64,

    /// URL prefix under which cached audio is served
    pub audio_url_prefix: String,

    /// Request timeout in seconds (default: 60)
    pub request_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            transcription_api_key: None,
            transcription_base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice: "Bella".to_string(),
            synthesis_model: "eleven_monolingual_v1".to_string(),
            audio_cache_dir: PathBuf::from("data/audio_cache"),
            audio_cache_max_age_hours: 24,
            audio_url_prefix: "/api/v1/audio".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl VoiceConfig {
    pub fn audio_cache_max_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.audio_cache_max_age_hours * 3600)
    }
}

impl SessionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_history == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.max_history".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.session_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.session_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.store_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.store_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.breaker_failure_threshold == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.breaker_failure_threshold".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl LlmConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigValidationError::MissingApiKey("OPENAI_API_KEY".into()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigValidationError::InvalidValue {
                field: "llm.temperature".into(),
                message: "must be between 0 and 2".into(),
            });
        }

        if self.max_tokens == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "llm.max_tokens".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("missing required API key: {0}")]
    MissingApiKey(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let session = SessionConfig::default();
        assert_eq!(session.max_history, 50);
        assert_eq!(session.session_timeout_secs, 3600);
        assert_eq!(session.cleanup_interval_secs, 300);

        let llm = LlmConfig::default();
        assert_eq!(llm.model, "gpt-4o-mini");
        assert_eq!(llm.max_tokens, 150);
        assert!(llm.system_prompt.contains("Emot"));

        let voice = VoiceConfig::default();
        assert_eq!(voice.voice, "Bella");
        assert_eq!(voice.audio_cache_max_age().as_secs(), 24 * 3600);
    }

    #[test]
    fn test_session_config_in_dir() {
        let config = SessionConfig::in_dir("/tmp/emot");
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/emot/sessions"));
        assert!(config.database_path.ends_with("sessions/conversations.db"));
    }

    #[test]
    fn test_session_config_validation() {
        let mut config = SessionConfig::default();
        assert!(config.validate().is_ok());

        config.max_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_llm_config_validation() {
        let mut config = LlmConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingApiKey(_))
        ));

        config.api_key = Some("sk-test".into());
        assert!(config.validate().is_ok());

        config.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"max_history": 10}"#).unwrap();
        assert_eq!(config.max_history, 10);
        assert_eq!(config.session_timeout_secs, 3600);
    }
}
