//! Message handlers: send, fetch a conversation, mark read.

use crate::core::media;
use crate::core::{AppState, Ctx, Error, Result};
use crate::core::models::{Message, MessageId, SendMessageInput};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

/// POST /api/messages/send/{receiver_id}
///
/// Inline `data:` media is uploaded to the media store before the message
/// is persisted, so only URLs are ever stored.
pub async fn send_message(
    ctx: Ctx,
    Path(receiver_id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    info!("POST /api/messages/send/{} from {}", receiver_id, ctx.user_id());

    let payload = input.into_payload()?;

    if !state.users.exists(&receiver_id).await? {
        return Err(Error::not_found(format!("user {}", receiver_id)));
    }

    let payload = media::materialize(state.media.as_ref(), payload).await?;
    let message = state
        .router
        .send(ctx.user_id(), &receiver_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{other_id}
///
/// Returns the conversation as it was before this read, then marks the
/// returned messages from the other user as seen. Anything that arrives
/// after the read stays unseen.
pub async fn get_conversation(
    ctx: Ctx,
    Path(other_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Message>>> {
    info!("GET /api/messages/{} by {}", other_id, ctx.user_id());

    let messages = state.store.conversation(ctx.user_id(), &other_id).await?;

    let unread: Vec<MessageId> = messages
        .iter()
        .filter(|m| !m.seen && m.sender_id == other_id)
        .map(|m| m.id.clone())
        .collect();
    if !unread.is_empty() {
        state.store.mark_messages_read(ctx.user_id(), &unread).await?;
    }

    Ok(Json(messages))
}

/// PUT /api/messages/mark/{message_id}
///
/// Only the receiver may mark a message; anyone else sees 404.
pub async fn mark_message_read(
    ctx: Ctx,
    Path(message_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode> {
    info!("PUT /api/messages/mark/{} by {}", message_id, ctx.user_id());

    let not_found = || Error::not_found(format!("message {}", message_id));
    let message = state.store.message(&message_id).await?.ok_or_else(not_found)?;
    if message.receiver_id != ctx.user_id() {
        return Err(not_found());
    }

    state.store.mark_message_read(&message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
