//! OpenAI chat completions and Whisper transcription.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    audio_mime_type, ChatModel, GenerationParams, ProviderError, ProviderResult, Transcriber,
};
use crate::config::{LlmConfig, VoiceConfig};
use crate::prompt::ChatTurn;

fn http_client(timeout_secs: u64) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Request(e.to_string()))
}

async fn error_for_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("OpenAI chat".into()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> ProviderResult<String> {
        let api_key = self.api_key()?;
        let request = CompletionRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|t| RequestMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        };

        debug!(model = %self.model, turns = turns.len(), "Requesting chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let body: CompletionResponse = error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::Empty("chat completion".into()))?;

        info!(reply_len = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI Whisper transcription client.
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(config: &VoiceConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key: config
                .transcription_api_key
                .clone()
                .filter(|k| !k.is_empty()),
            base_url: config.transcription_base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai-whisper"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio: &[u8], format: &str) -> ProviderResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("OpenAI transcription".into()))?;

        let extension = format.trim_start_matches('.');
        let file_part = Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", extension))
            .mime_str(audio_mime_type(extension))
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        debug!(bytes = audio.len(), format = %extension, "Transcribing audio");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let body: TranscriptionResponse = error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Empty("transcription".into()));
        }

        info!(text_len = text.len(), "Transcription complete");
        Ok(text)
    }
}
