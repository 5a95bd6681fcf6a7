//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ProviderError, ProviderResult, SpeechSynthesizer};
use crate::config::VoiceConfig;
use crate::emotion::{Emotion, VoiceSettings};

/// Premade voices addressable by name.
const KNOWN_VOICES: &[(&str, &str)] = &[
    ("Rachel", "21m00Tcm4TlvDq8ikWAM"),
    ("Domi", "AZnzlk1XvdvUeBnXmlld"),
    ("Bella", "EXAVITQu4vr4xnSDxMaL"),
    ("Antoni", "ErXwobaYiN019PkySvjV"),
    ("Elli", "MF3mGyEYCl7XYWbV9V6O"),
    ("Josh", "TxGEqnHWrfWFTfGW9XjX"),
    ("Arnold", "VR6AewLTigWG4xSOukaG"),
    ("Adam", "pNInz6obpgDQGcFAw5EJ"),
    ("Sam", "yoZ06aMxZJJ28mfd3POQ"),
];

/// Map a premade voice name to its id; anything else is taken as an id.
pub(crate) fn resolve_voice_id(voice: &str) -> &str {
    KNOWN_VOICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(voice))
        .map(|(_, id)| *id)
        .unwrap_or(voice)
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs synthesis client.
#[derive(Debug, Clone)]
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &VoiceConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.elevenlabs_api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.elevenlabs_base_url.trim_end_matches('/').to_string(),
            model: config.synthesis_model.clone(),
        })
    }

    /// `<base>/text-to-speech/<voice_id>`, with the id encoded as one path
    /// segment.
    fn synthesis_url(&self, voice_id: &str) -> ProviderResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Request(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Request(format!("base URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push("text-to-speech")
            .push(voice_id);
        Ok(url)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(
        &self,
        text: &str,
        emotion: Emotion,
        voice: &str,
    ) -> ProviderResult<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("ElevenLabs".into()))?;

        let url = self.synthesis_url(resolve_voice_id(voice))?;
        let request = SynthesisRequest {
            text,
            model_id: &self.model,
            voice_settings: emotion.voice_settings(),
        };

        debug!(voice = %voice, emotion = %emotion, text_len = text.len(), "Synthesizing speech");

        let response = self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        if audio.is_empty() {
            return Err(ProviderError::Empty("speech synthesis".into()));
        }

        info!(bytes = audio.len(), "Speech synthesized");
        Ok(audio.to_vec())
    }
}
