//! Registry of live party sockets.
//!
//! Every upgraded socket holds a [`ConnectionGuard`] for its lifetime. The
//! manager knows which room and participant each socket joined as, and can
//! close every socket at once on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::utils::now_millis;

/// What a connection has joined, once it has.
#[derive(Debug, Clone, Default)]
struct ConnectionState {
    room_id: Option<String>,
    participant_id: Option<String>,
    connected_at: u64,
}

/// Live sockets keyed by connection id (`ws-N`).
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionState>,
    next_id: AtomicU64,
    /// Parent of every connection's token; swapped for a fresh one by
    /// [`close_all`](Self::close_all).
    shutdown: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            shutdown: RwLock::new(CancellationToken::new()),
        }
    }

    /// Tracks a new socket. Dropping the guard untracks it.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let conn_id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.shutdown.read().child_token();

        self.connections.insert(
            conn_id.clone(),
            ConnectionState {
                connected_at: now_millis(),
                ..ConnectionState::default()
            },
        );
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn attach(&self, id: &str, room_id: &str, participant_id: &str) {
        if let Some(mut state) = self.connections.get_mut(id) {
            state.room_id = Some(room_id.to_string());
            state.participant_id = Some(participant_id.to_string());
        }
    }

    fn unregister(&self, id: &str) {
        if let Some((_, state)) = self.connections.remove(id) {
            log::info!(
                "[WS] Connection unregistered: {} (room: {}, participant: {}, {}s, remaining: {})",
                id,
                state.room_id.as_deref().unwrap_or("-"),
                state.participant_id.as_deref().unwrap_or("-"),
                now_millis().saturating_sub(state.connected_at) / 1000,
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sockets joined to `room_id`. Sockets still in admission are not counted.
    #[must_use]
    pub fn room_connection_count(&self, room_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|c| c.room_id.as_deref() == Some(room_id))
            .count()
    }

    /// Signals every current socket to close; later sockets are unaffected.
    ///
    /// Each handler then leaves its room through the normal departure path.
    /// Returns how many sockets were signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count == 0 {
            log::debug!("[WS] close_all: no open connections");
            return count;
        }
        log::info!("[WS] Force-closing {} connection(s)", count);
        let mut shutdown = self.shutdown.write();
        shutdown.cancel();
        *shutdown = CancellationToken::new();
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a socket registered until dropped.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Marks the connection as joined to `room_id` as `participant_id`.
    pub fn attach(&self, room_id: &str, participant_id: &str) {
        self.manager.attach(&self.id, room_id, participant_id);
    }

    /// Cancelled when the server force-closes this socket.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_register_and_unregister() {
        let manager = Arc::new(WsConnectionManager::new());
        let first = manager.register();
        let second = manager.register();

        assert_ne!(first.id(), second.id());
        assert_eq!(manager.connection_count(), 2);

        drop(first);
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn attach_tracks_room_membership() {
        let manager = Arc::new(WsConnectionManager::new());
        let a = manager.register();
        let b = manager.register();
        let _idle = manager.register();

        a.attach("ABCD", "a");
        b.attach("ABCD", "b");

        assert_eq!(manager.room_connection_count("ABCD"), 2);
        assert_eq!(manager.room_connection_count("WXYZ"), 0);

        drop(a);
        assert_eq!(manager.room_connection_count("ABCD"), 1);
    }

    #[test]
    fn close_all_cancels_existing_tokens_only() {
        let manager = Arc::new(WsConnectionManager::new());
        let before = manager.register();

        assert_eq!(manager.close_all(), 1);
        assert!(before.cancel_token().is_cancelled());

        let after = manager.register();
        assert!(!after.cancel_token().is_cancelled());
    }

    #[test]
    fn close_all_without_connections_is_noop() {
        let manager = Arc::new(WsConnectionManager::new());
        assert_eq!(manager.close_all(), 0);
        assert!(!manager.register().cancel_token().is_cancelled());
    }
}
