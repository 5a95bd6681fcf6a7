//! Health check endpoint.

use axum::extract::State;
use emot_core::store::BreakerState;
use serde::Serialize;
use std::sync::Arc;

use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub breaker: BreakerState,
    pub chat_model: bool,
    pub transcription: bool,
    pub synthesis: bool,
}

/// Health check endpoint
///
/// Always answers 200; `status` is `degraded` when the database does not
/// respond or its breaker is not closed.
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResponse<HealthStatus> {
    let db_healthy = state.sessions.ping_primary().await.is_ok();
    let breaker = state.sessions.breaker_state();
    let voice = state.voice.status().await;

    let status = if db_healthy && breaker == BreakerState::Closed {
        "healthy"
    } else {
        "degraded"
    };

    ApiResponse(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            breaker,
            chat_model: state.chat.model_available(),
            transcription: voice.transcription_available,
            synthesis: voice.synthesis_available,
        },
    })
}
