//! One chat turn: history in, model reply out, both messages persisted.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::emotion::Emotion;
use crate::error::{Error, ErrorKind, Result};
use crate::prompt::build_prompt;
use crate::providers::{ChatModel, GenerationParams};
use crate::session::SessionManager;
use crate::types::Role;

/// Emotion tag stored with every assistant reply.
pub const REPLY_EMOTION: &str = "empathetic";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub session_id: String,
    pub emotion: String,
}

pub struct ChatService {
    sessions: Arc<SessionManager>,
    model: Arc<dyn ChatModel>,
    persona: String,
    params: GenerationParams,
}

impl ChatService {
    pub fn new(
        sessions: Arc<SessionManager>,
        model: Arc<dyn ChatModel>,
        persona: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            sessions,
            model,
            persona: persona.into(),
            params,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn model_available(&self) -> bool {
        self.model.is_available()
    }

    /// Answer `message` within a session, creating one when `session_id` is
    /// absent.
    ///
    /// A failing model never fails the turn: the emotion's fallback reply is
    /// returned and stored instead. A turn no storage tier accepted fails with
    /// `StorageUnavailable`.
    pub async fn respond(
        &self,
        session_id: Option<&str>,
        message: &str,
        emotion: Option<&str>,
    ) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(Error::invalid_input("Message is required"));
        }

        let session_id = match session_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self.sessions.create_session().await,
        };
        let emotion_tag = emotion
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(Emotion::Neutral.as_str());

        let history = match self.sessions.get_history(&session_id).await {
            Ok(history) => history,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) if e.kind() == ErrorKind::StorageDegraded => {
                warn!(session_id = %session_id, error = %e, "Replying without history");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let turns = build_prompt(&self.persona, &history, message, Some(emotion_tag));
        let reply = match self.model.complete(&turns, &self.params).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    provider = %self.model.name(),
                    error = %e,
                    "Chat model failed, using fallback reply"
                );
                Emotion::parse(emotion_tag).fallback_reply().to_string()
            }
        };

        let stored_user = self
            .sessions
            .append_message(&session_id, Role::User, message, Some(emotion_tag))
            .await?;
        let stored_reply = self
            .sessions
            .append_message(&session_id, Role::Assistant, &reply, Some(REPLY_EMOTION))
            .await?;
        if !(stored_user && stored_reply) {
            return Err(Error::StorageUnavailable(format!(
                "chat turn for session {} was not stored",
                session_id
            )));
        }

        info!(
            session_id = %session_id,
            emotion = %emotion_tag,
            history_len = history.len(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            message: reply,
            session_id,
            emotion: REPLY_EMOTION.to_string(),
        })
    }
}
