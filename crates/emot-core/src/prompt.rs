//! Prompt windowing.
//!
//! Turns stored history plus the incoming message into the ordered turn list
//! handed to the chat model. Pure and deterministic.

use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;
use crate::types::{Message, Role};

/// Conversation turns forwarded to the model, new message included.
pub const WINDOW_SIZE: usize = 20;

const EMOTION_CONTEXT_PREFIX: &str = "\n\nCurrent emotional context: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TurnRole::User,
            Role::Assistant => TurnRole::Assistant,
        }
    }
}

/// One role-tagged turn of a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The system turn: persona followed by the guidance for `emotion`.
pub fn system_prompt(persona: &str, emotion: Emotion) -> String {
    format!("{}{}{}", persona, EMOTION_CONTEXT_PREFIX, emotion.guidance())
}

/// Build the request turns for a new user message.
///
/// The output is one system turn followed by at most [`WINDOW_SIZE`]
/// conversation turns, oldest first, ending with `new_message`. Older turns
/// are dropped, not summarized. An unknown or missing `emotion` tag uses the
/// neutral guidance.
pub fn build_prompt(
    persona: &str,
    history: &[Message],
    new_message: &str,
    emotion: Option<&str>,
) -> Vec<ChatTurn> {
    let emotion = Emotion::from_tag(emotion);
    let keep = WINDOW_SIZE.saturating_sub(1).min(history.len());

    let mut turns = Vec::with_capacity(keep + 2);
    turns.push(ChatTurn::new(TurnRole::System, system_prompt(persona, emotion)));
    turns.extend(
        history[history.len() - keep..]
            .iter()
            .map(|m| ChatTurn::new(m.role.into(), m.content.clone())),
    );
    turns.push(ChatTurn::new(TurnRole::User, new_message));
    turns
}
