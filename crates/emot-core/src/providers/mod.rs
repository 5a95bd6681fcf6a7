//! Provider traits for the external collaborators.
//!
//! The core only depends on these traits. HTTP clients for OpenAI and
//! ElevenLabs live behind the `providers` feature.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::LlmConfig;
use crate::emotion::Emotion;
use crate::prompt::ChatTurn;

#[cfg(feature = "providers")]
mod elevenlabs;
#[cfg(feature = "providers")]
mod openai;

#[cfg(feature = "providers")]
pub use elevenlabs::ElevenLabsSynthesizer;
#[cfg(feature = "providers")]
pub use openai::{OpenAiChat, OpenAiTranscriber};

/// Errors from an external provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider has no credentials.
    #[error("{0} is not configured")]
    NotConfigured(String),
    /// Transport-level failure.
    #[error("request error: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// Response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Provider answered with nothing usable.
    #[error("{0} returned an empty result")]
    Empty(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Sampling parameters for a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        }
    }
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        }
    }
}

/// Language model that completes a role-tagged conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn complete(&self, turns: &[ChatTurn], params: &GenerationParams)
    -> ProviderResult<String>;
}

/// Speech-to-text provider.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Model identifier reported in status output.
    fn model(&self) -> &str;

    /// Transcribe raw audio in the declared `format` (file extension).
    async fn transcribe(&self, audio: &[u8], format: &str) -> ProviderResult<String>;
}

/// Text-to-speech provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Synthesize `text` with `voice`, modulated for `emotion`. Returns MP3 bytes.
    async fn synthesize(&self, text: &str, emotion: Emotion, voice: &str)
    -> ProviderResult<Vec<u8>>;
}

/// MIME type for an audio file extension.
pub fn audio_mime_type(format: &str) -> &'static str {
    match format.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "mp3" | "mpeg" | "mpga" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => "audio/webm",
    }
}
