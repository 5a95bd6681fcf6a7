//! Router test fixtures: scripted providers and request helpers.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use emot_core::prompt::ChatTurn;
use emot_core::providers::{
    ChatModel, GenerationParams, ProviderError, ProviderResult, SpeechSynthesizer, Transcriber,
};
use emot_core::{Database, Emotion, SessionManager};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use super::create_router;
use crate::config::Config;
use crate::state::AppState;

pub struct EchoModel {
    pub fail: bool,
}

#[async_trait]
impl ChatModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    fn is_available(&self) -> bool {
        !self.fail
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        _params: &GenerationParams,
    ) -> ProviderResult<String> {
        if self.fail {
            return Err(ProviderError::Request("connection reset".into()));
        }
        let last = turns.last().map(|t| t.content.as_str()).unwrap_or_default();
        Ok(format!("I hear you: {}", last))
    }
}

pub struct FixedTranscriber;

#[async_trait]
impl Transcriber for FixedTranscriber {
    fn name(&self) -> &str {
        "fixed"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        "whisper-1"
    }

    async fn transcribe(&self, audio: &[u8], _format: &str) -> ProviderResult<String> {
        Ok(format!("{} bytes of speech", audio.len()))
    }
}

#[derive(Default)]
pub struct CountingSynthesizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for CountingSynthesizer {
    fn name(&self) -> &str {
        "counting"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        text: &str,
        _emotion: Emotion,
        _voice: &str,
    ) -> ProviderResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ID3{}", text).into_bytes())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub synthesizer: Arc<CountingSynthesizer>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_model(EchoModel { fail: false })
    }

    pub fn with_model(model: EchoModel) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::defaults_in(dir.path());
        config.llm.api_key = Some("sk-test".into());

        let sessions = SessionManager::new(
            Arc::new(Database::open_in_memory().unwrap()),
            &config.session,
        );
        let synthesizer = Arc::new(CountingSynthesizer::default());
        let state = AppState::new(
            config,
            Arc::new(sessions),
            Arc::new(model),
            Arc::new(FixedTranscriber),
            synthesizer.clone(),
        );

        Self {
            router: create_router(state.clone()),
            state,
            synthesizer,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, body: String) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

#[tokio::test]
async fn test_unknown_route_is_enveloped_404() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}
