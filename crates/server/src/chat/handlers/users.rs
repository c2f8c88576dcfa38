//! Sidebar, presence and unseen-count handlers.

use crate::core::models::{SidebarResponse, SidebarUser, UserId};
use crate::core::{AppState, Ctx, Result};
use axum::{extract::State, Json};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// GET /api/messages/users
///
/// Every other user with their online flag, plus unseen counts.
pub async fn sidebar(ctx: Ctx, State(state): State<AppState>) -> Result<Json<SidebarResponse>> {
    info!("GET /api/messages/users by {}", ctx.user_id());

    let others = state.users.others(ctx.user_id()).await?;
    let candidates: Vec<UserId> = others.iter().map(|u| u.id.clone()).collect();
    let unseen = state.unseen.unseen_counts(ctx.user_id(), &candidates).await?;

    let users = others
        .into_iter()
        .map(|user| SidebarUser {
            online: state.presence.is_online(&user.id),
            user,
        })
        .collect();

    Ok(Json(SidebarResponse { users, unseen }))
}

/// GET /api/messages/unseen
pub async fn unseen_counts(
    ctx: Ctx,
    State(state): State<AppState>,
) -> Result<Json<HashMap<UserId, u64>>> {
    let candidates: Vec<UserId> = state
        .users
        .others(ctx.user_id())
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();

    let counts = state.unseen.unseen_counts(ctx.user_id(), &candidates).await?;
    Ok(Json(counts))
}

/// GET /api/messages/online
pub async fn online_users(State(state): State<AppState>) -> Json<BTreeSet<UserId>> {
    Json(state.presence.online_user_ids())
}
