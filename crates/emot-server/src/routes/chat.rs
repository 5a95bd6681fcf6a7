//! Chat route.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use emot_core::ChatReply;
use serde::Deserialize;
use std::sync::Arc;

use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

/// Create chat router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub session_id: Option<String>,
    pub emotion: Option<String>,
}

/// Answer one message
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatReply> {
    let Json(req) = body?;
    let reply = state
        .chat
        .respond(
            req.session_id.as_deref(),
            &req.message,
            req.emotion.as_deref(),
        )
        .await?;
    Ok(ApiResponse(reply))
}
