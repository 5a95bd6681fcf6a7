//! emot-server - Emot backend server
//!
//! REST API for emotional chat, session history and voice.

use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod response;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("emot_server=info,emot_core=info,tower_http=info")
            }),
        )
        .init();

    info!("emot-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    config.validate()?;
    info!("Config loaded from {:?}", config.config_path);

    let bind_addr = config.bind_addr();
    let sweep_period = Duration::from_secs(config.session.cleanup_interval_secs.max(1));
    let state = state::AppState::from_config(config)?;

    let sweeper = Arc::new(services::Sweeper::new(
        state.sessions.clone(),
        state.voice.clone(),
        sweep_period,
    ));
    sweeper.clone().start().await;

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    sweeper.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
