//! API route modules.

pub mod chat;
pub mod health;
pub mod sessions;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

use axum::{http::Uri, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::response::ApiError;
use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(chat::router())
        .merge(sessions::router())
        .merge(voice::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
