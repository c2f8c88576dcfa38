//! Chat Handlers and Router
//!
//! Messaging, presence and unseen-count routes. Every route here needs a
//! caller identity.

use crate::core::identity::mw_identify;
use crate::core::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

pub mod messages;
pub mod users;
pub mod websocket;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Sidebar and presence
        .route("/api/messages/users", get(users::sidebar))
        .route("/api/messages/unseen", get(users::unseen_counts))
        .route("/api/messages/online", get(users::online_users))
        // Conversations
        .route("/api/messages/{other_id}", get(messages::get_conversation))
        .route(
            "/api/messages/send/{receiver_id}",
            post(messages::send_message),
        )
        .route(
            "/api/messages/mark/{message_id}",
            put(messages::mark_message_read),
        )
        // Live delivery
        .route("/ws", get(websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(state, mw_identify))
}
