use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Resolve the caller from the identity header set by the auth gateway.
///
/// The gateway has already verified credentials; the id is trusted as is.
pub async fn mw_identify(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: identify");

    let user_id = req
        .headers()
        .get(state.config.identity_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingIdentity)?
        .to_string();

    req.extensions_mut().insert(Ctx::new(user_id));

    Ok(next.run(req).await)
}
