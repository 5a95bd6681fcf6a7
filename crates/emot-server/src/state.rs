//! Application state.

use anyhow::Context;
use emot_core::providers::{
    ChatModel, ElevenLabsSynthesizer, GenerationParams, OpenAiChat, OpenAiTranscriber,
    SpeechSynthesizer, Transcriber,
};
use emot_core::{ChatService, SessionManager, VoiceService};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Session persistence
    pub sessions: Arc<SessionManager>,
    /// Chat turns
    pub chat: Arc<ChatService>,
    /// Transcription, synthesis and audio cache
    pub voice: Arc<VoiceService>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Assemble state from already-built components.
    pub fn new(
        config: Config,
        sessions: Arc<SessionManager>,
        model: Arc<dyn ChatModel>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Arc<Self> {
        let chat = ChatService::new(
            Arc::clone(&sessions),
            model,
            config.llm.system_prompt.clone(),
            GenerationParams::from(&config.llm),
        );
        let voice = VoiceService::new(transcriber, synthesizer, &config.voice);

        Arc::new(Self {
            config: Arc::new(config),
            sessions,
            chat: Arc::new(chat),
            voice: Arc::new(voice),
            start_time: Instant::now(),
        })
    }

    /// Open storage and build the provider clients named in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Arc<Self>> {
        let sessions = SessionManager::open(&config.session).with_context(|| {
            format!(
                "opening session store at {}",
                config.session.database_path.display()
            )
        })?;
        let model = OpenAiChat::new(&config.llm)?;
        let transcriber = OpenAiTranscriber::new(&config.voice)?;
        let synthesizer = ElevenLabsSynthesizer::new(&config.voice)?;

        info!(
            model = %config.llm.model,
            transcription = transcriber.is_available(),
            synthesis = synthesizer.is_available(),
            "Providers configured"
        );

        Ok(Self::new(
            config,
            Arc::new(sessions),
            Arc::new(model),
            Arc::new(transcriber),
            Arc::new(synthesizer),
        ))
    }
}
