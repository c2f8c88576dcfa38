//! Presence Registry
//!
//! Process-local map of which users hold live connections. Empty at startup,
//! mutated only by `connect`/`disconnect`, cleared on shutdown. Both indexes
//! sit behind one mutex so no caller ever sees a half-applied change.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::DeliveryFailure;
use crate::core::models::{ServerEvent, UserId};

/// Identity of a single live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live transport endpoint that can receive pushed events.
///
/// `push` must return without waiting on the peer.
pub trait ConnectionHandle: Send + Sync {
    fn id(&self) -> ConnectionId;
    fn push(&self, event: &ServerEvent) -> Result<(), DeliveryFailure>;
}

/// Connection handle backed by a bounded channel.
///
/// The transport drains the receiving half and writes to the socket, so a
/// push only enqueues. A full queue means the peer is not keeping up and the
/// event is dropped.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ChannelConnection {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }
}

impl ConnectionHandle for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn push(&self, event: &ServerEvent) -> Result<(), DeliveryFailure> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Saturated,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Presence transition caused by a connect or disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    CameOnline(UserId),
    WentOffline(UserId),
    Unchanged,
}

#[derive(Default)]
struct PresenceState {
    /// user -> live handles; a user with no handles has no entry
    by_user: HashMap<UserId, HashMap<ConnectionId, Arc<dyn ConnectionHandle>>>,
    /// handle -> owning user
    owners: HashMap<ConnectionId, UserId>,
}

impl PresenceState {
    fn remove(&mut self, connection_id: ConnectionId) -> PresenceChange {
        let Some(user_id) = self.owners.remove(&connection_id) else {
            return PresenceChange::Unchanged;
        };

        let now_empty = match self.by_user.get_mut(&user_id) {
            Some(handles) => {
                handles.remove(&connection_id);
                handles.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.by_user.remove(&user_id);
            PresenceChange::WentOffline(user_id)
        } else {
            PresenceChange::Unchanged
        }
    }
}

#[derive(Default)]
pub struct PresenceRegistry {
    state: Mutex<PresenceState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live handle for `user_id`.
    pub fn connect(&self, user_id: &str, handle: Arc<dyn ConnectionHandle>) -> PresenceChange {
        let connection_id = handle.id();
        let mut state = self.state.lock();

        // A handle id belongs to exactly one user
        let mut previous = PresenceChange::Unchanged;
        if state.owners.get(&connection_id).map(String::as_str) != Some(user_id) {
            previous = state.remove(connection_id);
        }

        let was_online = state.by_user.contains_key(user_id);
        state
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id, handle);
        state.owners.insert(connection_id, user_id.to_string());

        debug!(
            "[Presence] {} connected via {} ({} users online)",
            user_id,
            connection_id,
            state.by_user.len()
        );

        if let PresenceChange::WentOffline(old) = previous {
            debug!("[Presence] handle {} moved away from {}", connection_id, old);
        }

        if was_online {
            PresenceChange::Unchanged
        } else {
            PresenceChange::CameOnline(user_id.to_string())
        }
    }

    /// Drop exactly this handle; the user goes offline with its last one.
    pub fn disconnect(&self, connection_id: ConnectionId) -> PresenceChange {
        let change = self.state.lock().remove(connection_id);
        debug!("[Presence] {} disconnected: {:?}", connection_id, change);
        change
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.state.lock().by_user.contains_key(user_id)
    }

    /// Snapshot of every user with at least one live handle.
    pub fn online_user_ids(&self) -> BTreeSet<UserId> {
        self.state.lock().by_user.keys().cloned().collect()
    }

    /// Snapshot of the live handles of one user.
    pub(crate) fn connections_for(&self, user_id: &str) -> Vec<Arc<dyn ConnectionHandle>> {
        self.state
            .lock()
            .by_user
            .get(user_id)
            .map(|handles| handles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every live handle.
    pub(crate) fn all_connections(&self) -> Vec<Arc<dyn ConnectionHandle>> {
        self.state
            .lock()
            .by_user
            .values()
            .flat_map(|handles| handles.values().cloned())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Forget every connection. Used at shutdown.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.by_user.clear();
        state.owners.clear();
    }
}
