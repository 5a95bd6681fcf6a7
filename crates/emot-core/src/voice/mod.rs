//! Speech in and speech out.
//!
//! Unlike chat, there is no safe textual fallback here: provider failures are
//! returned as [`Error::Provider`].

mod cache;

pub use cache::AudioCache;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::VoiceConfig;
use crate::emotion::Emotion;
use crate::error::{Error, Result};
use crate::providers::{SpeechSynthesizer, Transcriber};

/// A synthesized clip available from the audio cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisResult {
    pub filename: String,
    pub audio_url: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceStatus {
    pub transcription_available: bool,
    pub transcription_model: String,
    pub synthesis_available: bool,
    pub voice: String,
    pub audio_cache_dir: PathBuf,
    pub cache_files_count: usize,
}

/// Voice names and ids are single path segments for the provider.
fn is_valid_voice(voice: &str) -> bool {
    !voice.is_empty()
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub struct VoiceService {
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: AudioCache,
    default_voice: String,
    url_prefix: String,
    max_age: Duration,
}

impl VoiceService {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            transcriber,
            synthesizer,
            cache: AudioCache::new(&config.audio_cache_dir),
            default_voice: config.voice.clone(),
            url_prefix: config.audio_url_prefix.trim_end_matches('/').to_string(),
            max_age: config.audio_cache_max_age(),
        }
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// Transcribe raw audio of the declared format.
    pub async fn transcribe(&self, audio: &[u8], format: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::invalid_input("Audio data is required"));
        }
        let format = match format.trim() {
            "" => "webm",
            f => f,
        };

        match self.transcriber.transcribe(audio, format).await {
            Ok(text) => {
                info!(bytes = audio.len(), format = %format, "Transcribed audio");
                Ok(text)
            }
            Err(e) => {
                error!(
                    provider = %self.transcriber.name(),
                    error = %e,
                    "Transcription failed"
                );
                Err(e.into())
            }
        }
    }

    /// Synthesize speech and place it in the audio cache.
    ///
    /// Identical requests reuse the cached file without calling the provider.
    pub async fn synthesize(
        &self,
        text: &str,
        emotion: Option<&str>,
        voice: Option<&str>,
    ) -> Result<SynthesisResult> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("Text is required"));
        }
        let emotion = Emotion::from_tag(emotion);
        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_voice.as_str());
        if !is_valid_voice(voice) {
            return Err(Error::invalid_input(
                "Voice may only contain letters, digits, '-' and '_'",
            ));
        }

        let filename = AudioCache::filename_for(voice, emotion.as_str(), text);
        if self.cache.contains(&filename).await {
            let bytes = self.cache.read(&filename).await?.len();
            return Ok(self.result(filename, bytes));
        }

        let audio = match self.synthesizer.synthesize(text, emotion, voice).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(
                    provider = %self.synthesizer.name(),
                    voice = %voice,
                    error = %e,
                    "Speech synthesis failed"
                );
                return Err(e.into());
            }
        };

        self.cache.store(&filename, &audio).await?;
        info!(filename = %filename, emotion = %emotion, bytes = audio.len(), "Synthesized speech");
        Ok(self.result(filename, audio.len()))
    }

    fn result(&self, filename: String, bytes: usize) -> SynthesisResult {
        SynthesisResult {
            audio_url: format!("{}/{}", self.url_prefix, filename),
            filename,
            bytes,
        }
    }

    pub async fn read_audio(&self, filename: &str) -> Result<Vec<u8>> {
        self.cache.read(filename).await
    }

    /// Drop cached audio older than the configured age.
    pub async fn cleanup_cache(&self) -> Result<usize> {
        self.cache.cleanup(self.max_age).await
    }

    pub async fn status(&self) -> VoiceStatus {
        let cache_files_count = self.cache.file_count().await.unwrap_or_else(|e| {
            warn!(error = %e, "Audio cache unreadable");
            0
        });
        VoiceStatus {
            transcription_available: self.transcriber.is_available(),
            transcription_model: self.transcriber.model().to_string(),
            synthesis_available: self.synthesizer.is_available(),
            voice: self.default_voice.clone(),
            audio_cache_dir: self.cache.dir().to_path_buf(),
            cache_files_count,
        }
    }
}
