//! Delivery Router
//!
//! Persists a message, then pushes it to every live connection of the
//! receiver. Delivery is at-most-once and unacknowledged: a failed push is
//! logged and dropped, and never fails the send. The receiver sees the
//! message on its next conversation fetch either way.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chat::presence::{ConnectionHandle, PresenceRegistry};
use crate::chat::store::MessageStore;
use crate::core::error::Result;
use crate::core::models::{Message, Payload, ServerEvent};

/// How a fan-out went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub attempted: usize,
    pub delivered: usize,
}

pub struct DeliveryRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
}

impl DeliveryRouter {
    pub fn new(store: Arc<dyn MessageStore>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Persist and push a new message.
    ///
    /// Returns once the message is durable; persistence errors are returned
    /// as is and never retried, since a second append would duplicate it.
    pub async fn send(&self, sender_id: &str, receiver_id: &str, payload: Payload) -> Result<Message> {
        let message = self.store.append(sender_id, receiver_id, payload).await?;

        let handles = self.presence.connections_for(receiver_id);
        let fan_out = push_all(&handles, &ServerEvent::NewMessage(message.clone()));

        info!(
            "Message {} {} -> {} delivered live to {}/{} connections",
            message.id, sender_id, receiver_id, fan_out.delivered, fan_out.attempted
        );

        Ok(message)
    }

    /// Tell every connected client who is online right now.
    pub fn broadcast_online_users(&self) -> FanOut {
        let online = self.presence.online_user_ids();
        let handles = self.presence.all_connections();
        let fan_out = push_all(&handles, &ServerEvent::OnlineUsers(online));
        debug!(
            "Online users broadcast to {}/{} connections",
            fan_out.delivered, fan_out.attempted
        );
        fan_out
    }

    /// Send the online snapshot to a single connection.
    pub fn send_online_users(&self, handle: &dyn ConnectionHandle) -> bool {
        let event = ServerEvent::OnlineUsers(self.presence.online_user_ids());
        push_one(handle, &event)
    }
}

fn push_all(handles: &[Arc<dyn ConnectionHandle>], event: &ServerEvent) -> FanOut {
    let delivered = handles
        .iter()
        .filter(|&handle| push_one(&**handle, event))
        .count();
    FanOut {
        attempted: handles.len(),
        delivered,
    }
}

fn push_one(handle: &dyn ConnectionHandle, event: &ServerEvent) -> bool {
    match handle.push(event) {
        Ok(()) => true,
        Err(e) => {
            warn!("Receiver unreachable on connection {}: {}", handle.id(), e);
            false
        }
    }
}
