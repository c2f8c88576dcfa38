//! Direct Chat Server Library
//!
//! One-to-one messaging with presence tracking, best-effort live delivery
//! over WebSockets and per-sender unseen counts.

pub mod chat;
pub mod core;

use axum::{extract::DefaultBodyLimit, Router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::core::{AppState, ChatServerConfig};

/// Build the full HTTP application for `state`.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes();

    Router::new()
        .merge(crate::core::router())
        .merge(crate::chat::router(state.clone()))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Install the global tracing subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("=== Direct Chat Server ===");

    let config = ChatServerConfig::from_env();
    info!("Database: {}", config.database_url);
    info!("Media directory: {:?}", config.media_dir);

    let state = AppState::build(config.clone()).await?;
    let presence = state.presence.clone();
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Presence never outlives the process
    presence.clear();
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
