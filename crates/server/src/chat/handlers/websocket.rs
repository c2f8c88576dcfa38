//! WebSocket upgrade and connection handling.
//!
//! Each socket is one connection handle in the presence registry for as
//! long as it stays open.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::chat::presence::{ChannelConnection, ConnectionHandle, PresenceChange};
use crate::core::models::UserId;
use crate::core::{AppState, Ctx};

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, ctx: Ctx, State(state): State<AppState>) -> Response {
    let user_id = ctx.user_id().to_string();
    ws.on_upgrade(move |socket| ws_connection(socket, user_id, state))
}

async fn ws_connection(socket: WebSocket, user_id: UserId, state: AppState) {
    let (connection, mut events) = ChannelConnection::new(state.config.push_buffer);
    let connection: Arc<dyn ConnectionHandle> = Arc::new(connection);
    let connection_id = connection.id();

    match state.presence.connect(&user_id, connection.clone()) {
        PresenceChange::CameOnline(_) => {
            info!("[WS] {} is online ({})", user_id, connection_id);
            state.router.broadcast_online_users();
        }
        _ => {
            debug!("[WS] {} opened another connection ({})", user_id, connection_id);
            state.router.send_online_users(&*connection);
        }
    }
    // The registry holds the only handle needed from here on
    drop(connection);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Forward pushed events to the client
            event = events.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sink.send(WsMessage::Text(json.into())).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => warn!("[WS] Failed to encode event: {}", e),
                }
            }
            // Client frames carry nothing but liveness
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sink.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    if let PresenceChange::WentOffline(_) = state.presence.disconnect(connection_id) {
        info!("[WS] {} is offline", user_id);
        state.router.broadcast_online_users();
    } else {
        debug!("[WS] {} closed connection {}", user_id, connection_id);
    }
}
