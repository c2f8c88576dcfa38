//! Core Router
//!
//! Handles shared infrastructure routes that need no caller identity.

use crate::core::media;
use crate::core::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        // Media served back from the local media store
        .route("/media/{kind}/{file}", get(media::get_media))
}

async fn health_check() -> &'static str {
    "OK - Direct Chat Server"
}
