//! Voice routes: transcription, synthesis and cached audio.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use emot_core::voice::VoiceStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Create voice router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice/transcribe", post(transcribe))
        .route("/voice/synthesize", post(synthesize))
        .route("/voice/status", get(voice_status))
        .route("/audio/{filename}", get(get_audio))
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Base64-encoded audio
    #[serde(default)]
    pub audio: String,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Transcription {
    pub text: String,
}

/// Transcribe base64 audio to text
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TranscribeRequest>, JsonRejection>,
) -> ApiResult<Transcription> {
    let Json(req) = body?;
    if req.audio.trim().is_empty() {
        return Err(ApiError::invalid_input("Audio data is required"));
    }
    let audio = base64::engine::general_purpose::STANDARD
        .decode(req.audio.trim())
        .map_err(|e| ApiError::invalid_input(format!("Audio is not valid base64: {}", e)))?;

    let text = state
        .voice
        .transcribe(&audio, req.format.as_deref().unwrap_or_default())
        .await?;
    Ok(ApiResponse(Transcription { text }))
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub text: String,
    pub emotion: Option<String>,
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SynthesizedAudio {
    pub filename: String,
    pub audio_url: String,
}

/// Synthesize speech into the audio cache
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> ApiResult<SynthesizedAudio> {
    let Json(req) = body?;
    let result = state
        .voice
        .synthesize(&req.text, req.emotion.as_deref(), req.voice.as_deref())
        .await?;
    Ok(ApiResponse(SynthesizedAudio {
        filename: result.filename,
        audio_url: result.audio_url,
    }))
}

pub async fn voice_status(State(state): State<Arc<AppState>>) -> ApiResponse<VoiceStatus> {
    ApiResponse(state.voice.status().await)
}

/// Serve a cached audio file
pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let audio = state.voice.read_audio(&filename).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
