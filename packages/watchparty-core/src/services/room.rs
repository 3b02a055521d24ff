//! A single room's authoritative playback state and connected clients.
//!
//! All reads and writes go through [`Room::lock`]. Holding the guard across a
//! mutation and the broadcast that follows it is what keeps broadcasts in
//! the same order as the writes they describe.

use axum::extract::ws::Utf8Bytes;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::protocol::{ParticipantInfo, StatePatch};
use crate::utils::elapsed_secs;

/// Authoritative playback state of a room.
///
/// `current_time` is the position as of `last_updated`, not the live
/// position; see [`RoomState::position_at`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    /// Media URL; empty when nothing is loaded.
    pub url: String,
    pub is_playing: bool,
    /// Position in seconds at `last_updated`.
    pub current_time: f64,
    /// Unix millis of the last authoritative write.
    pub last_updated: u64,
    /// Participant allowed to write state.
    pub host_id: String,
}

impl RoomState {
    /// Empty, paused state owned by `host_id`.
    pub fn new(host_id: impl Into<String>, now: u64) -> Self {
        Self {
            url: String::new(),
            is_playing: false,
            current_time: 0.0,
            last_updated: now,
            host_id: host_id.into(),
        }
    }

    /// Merges the provided fields and stamps the write time.
    ///
    /// A patch without `current_time` re-anchors the stored position to
    /// `now`, so pausing or re-stamping a playing room does not rewind it.
    pub fn apply(&mut self, patch: &StatePatch, now: u64) {
        if patch.current_time.is_none() {
            self.current_time = self.position_at(now);
        }
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(is_playing) = patch.is_playing {
            self.is_playing = is_playing;
        }
        if let Some(current_time) = patch.current_time {
            self.current_time = current_time;
        }
        self.last_updated = now;
    }

    /// Position extrapolated to `now`.
    ///
    /// Playing rooms advance in real time from `last_updated`; paused rooms
    /// report the stored position regardless of elapsed time.
    pub fn position_at(&self, now: u64) -> f64 {
        if self.is_playing {
            self.current_time + elapsed_secs(self.last_updated, now)
        } else {
            self.current_time
        }
    }
}

/// One live connection's membership in a room.
#[derive(Debug)]
pub struct ClientHandle {
    connection_id: String,
    participant: ParticipantInfo,
    outbound: mpsc::Sender<Utf8Bytes>,
}

/// Result of pushing a frame onto a client's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full; the client is lagging and misses this frame.
    Lagging,
    /// Connection task has gone away.
    Closed,
}

impl ClientHandle {
    pub fn new(
        connection_id: impl Into<String>,
        participant: ParticipantInfo,
        outbound: mpsc::Sender<Utf8Bytes>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            participant,
            outbound,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn participant(&self) -> &ParticipantInfo {
        &self.participant
    }

    pub fn participant_id(&self) -> &str {
        &self.participant.id
    }

    /// Queues a frame without waiting.
    pub fn try_deliver(&self, frame: Utf8Bytes) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Lagging,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Room state plus its client set, guarded together.
#[derive(Debug)]
pub struct RoomInner {
    pub state: RoomState,
    /// Connected clients in join order.
    clients: Vec<ClientHandle>,
    /// Set once the room has been removed from the registry.
    closed: bool,
}

/// Outcome of admitting a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    /// Joined a room that already had members.
    Member,
    /// Joined an empty room and now holds host.
    Host,
}

impl RoomInner {
    pub fn clients(&self) -> &[ClientHandle] {
        &self.clients
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_host(&self, participant_id: &str) -> bool {
        self.state.host_id == participant_id
    }

    /// Whether any live connection belongs to `participant_id`.
    pub fn is_member(&self, participant_id: &str) -> bool {
        self.clients.iter().any(|c| c.participant_id() == participant_id)
    }

    /// Participants in join order, one entry per participant id.
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.clients.len());
        let mut participants = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            if !seen.contains(&client.participant_id()) {
                seen.push(client.participant_id());
                participants.push(client.participant().clone());
            }
        }
        participants
    }

    /// Adds a client.
    ///
    /// A client entering an empty room finds it in the same condition as a
    /// freshly created one: default state, with the newcomer as host.
    pub fn admit(&mut self, client: ClientHandle, now: u64) -> Admitted {
        let admitted = if self.clients.is_empty() {
            self.state = RoomState::new(client.participant_id(), now);
            Admitted::Host
        } else {
            Admitted::Member
        };
        self.clients.push(client);
        admitted
    }

    /// Removes a connection, returning its handle if it was present.
    pub fn remove(&mut self, connection_id: &str) -> Option<ClientHandle> {
        let index = self
            .clients
            .iter()
            .position(|c| c.connection_id() == connection_id)?;
        Some(self.clients.remove(index))
    }

    /// Re-establishes the host invariant after a departure.
    ///
    /// Keeps the current host while any of their connections remain;
    /// otherwise promotes the earliest-joined remaining member. Returns the
    /// new host id when it changed.
    pub fn fail_over(&mut self) -> Option<String> {
        if self.is_member(&self.state.host_id) {
            return None;
        }
        let successor = self.clients.first()?.participant_id().to_string();
        self.state.host_id = successor.clone();
        Some(successor)
    }

    fn close_if_empty(&mut self) -> bool {
        if self.clients.is_empty() {
            self.closed = true;
        }
        self.closed
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// A room: identifier plus guarded state.
#[derive(Debug)]
pub struct Room {
    id: String,
    inner: Mutex<RoomInner>,
}

impl Room {
    /// Creates an empty room whose initial host is `host_id`.
    pub fn new(id: impl Into<String>, host_id: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(RoomInner {
                state: RoomState::new(host_id, now),
                clients: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock()
    }

    /// Marks the room closed if it has no clients. Returns whether it is closed.
    pub(crate) fn close_if_empty(&self) -> bool {
        self.inner.lock().close_if_empty()
    }

    pub(crate) fn close(&self) {
        self.inner.lock().close();
    }
}
