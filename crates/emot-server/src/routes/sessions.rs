//! Session routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use emot_core::{Message, SessionStats};
use serde::Serialize;
use std::sync::Arc;

use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;

/// Create session router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/stats", get(session_stats))
        .route("/sessions/{id}", get(get_session))
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub history: Vec<Message>,
}

/// Start a new session
pub async fn create_session(State(state): State<Arc<AppState>>) -> ApiResponse<CreatedSession> {
    let session_id = state.sessions.create_session().await;
    ApiResponse(CreatedSession { session_id })
}

/// Conversation history for a session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionHistory> {
    let history = state.sessions.get_history(&session_id).await?;
    Ok(ApiResponse(SessionHistory {
        session_id,
        history,
    }))
}

pub async fn session_stats(State(state): State<Arc<AppState>>) -> ApiResponse<SessionStats> {
    ApiResponse(state.sessions.stats(Utc::now()).await)
}
