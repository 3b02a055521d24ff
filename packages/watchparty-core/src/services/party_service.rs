//! Per-connection party logic: admission, host-only commands, departure.
//!
//! This is the transport-independent half of the WebSocket handler. The
//! axum glue in [`crate::api::ws`] owns the socket and forwards text frames
//! here; everything that touches room state happens in this module.
//!
//! Every mutation and the broadcast describing it run under one room lock,
//! so clients observe snapshots in the order the writes were applied.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

use super::broadcast::{build_snapshot, Broadcaster};
use super::room::{Admitted, ClientHandle, Room};
use super::room_registry::RoomRegistry;
use crate::clock::Clock;
use crate::error::{WatchPartyError, WatchPartyResult};
use crate::events::{EventEmitter, HostChangeReason, PartyEvent};
use crate::protocol::{Admission, ClientMessage, ParticipantInfo, Snapshot, StatePatch};

/// A joined connection's handle on its room.
///
/// Holds the exact [`Room`] instance the connection was admitted into, so
/// departure always acts on that room even if the id has since been reused.
#[derive(Debug)]
pub struct PartySession {
    room: Arc<Room>,
    connection_id: String,
    participant: ParticipantInfo,
}

impl PartySession {
    pub fn room_id(&self) -> &str {
        self.room.id()
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn participant(&self) -> &ParticipantInfo {
        &self.participant
    }
}

/// What happened to an inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// State changed and was broadcast.
    Applied,
    /// Sender is not the host; dropped.
    NotHost,
    /// `TRANSFER_HOST` target is empty or not connected to the room; dropped.
    UnknownTarget,
    /// Unparseable frame or invalid values; dropped.
    Malformed(String),
    /// The room was torn down underneath the connection.
    RoomClosed,
}

/// Result of a connection leaving its room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Departure {
    /// New host id if the departure triggered failover.
    pub new_host: Option<String>,
    /// Whether the room was deleted because it became empty.
    pub room_closed: bool,
}

/// Coordinates rooms, membership and host authority.
pub struct PartyService {
    registry: Arc<RoomRegistry>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    queue_capacity: usize,
}

impl PartyService {
    pub fn new(
        registry: Arc<RoomRegistry>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventEmitter>,
        queue_capacity: usize,
    ) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&clock));
        Self {
            registry,
            broadcaster,
            clock,
            emitter,
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Admits a connection into its room and broadcasts the new membership.
    ///
    /// Returns the session plus the receiving end of the connection's
    /// outbound queue; the first frame on it is the post-join snapshot.
    pub fn join(
        &self,
        admission: Admission,
        connection_id: impl Into<String>,
    ) -> (PartySession, mpsc::Receiver<Utf8Bytes>) {
        let Admission {
            room_id,
            participant,
        } = admission;
        let connection_id = connection_id.into();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        loop {
            let now = self.clock.now_millis();
            let (room, created) = self.registry.get_or_create(&room_id, &participant, now);
            let mut inner = room.lock();
            if inner.is_closed() {
                // Lost a race with the last member leaving; the id is free again.
                log::debug!("[Room] {} closed during join, retrying", room_id);
                continue;
            }

            let client = ClientHandle::new(connection_id.clone(), participant.clone(), tx.clone());
            let admitted = inner.admit(client, now);

            if created {
                self.emitter.emit_party(PartyEvent::RoomCreated {
                    room_id: room_id.clone(),
                    host_id: participant.id.clone(),
                    timestamp: now,
                });
            } else if admitted == Admitted::Host {
                log::info!(
                    "[Room] {} re-occupied before removal, {} is host",
                    room_id,
                    participant.id
                );
            }
            self.emitter.emit_party(PartyEvent::ParticipantJoined {
                room_id: room_id.clone(),
                participant_id: participant.id.clone(),
                connection_id: connection_id.clone(),
                timestamp: now,
            });
            log::info!(
                "[Room] {} joined {} as {} (members: {})",
                participant.id,
                room_id,
                connection_id,
                inner.clients().len()
            );

            self.broadcaster.broadcast_locked(&room_id, &inner);
            drop(inner);

            let session = PartySession {
                room,
                connection_id,
                participant,
            };
            return (session, rx);
        }
    }

    /// Parses and applies one inbound text frame.
    pub fn handle_text(&self, session: &PartySession, text: &str) -> CommandOutcome {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(session, message),
            Err(e) => {
                log::debug!(
                    "[WS] Dropping malformed frame from {}: {}",
                    session.connection_id,
                    e
                );
                CommandOutcome::Malformed(e.to_string())
            }
        }
    }

    /// Applies a parsed command if the sender is the room's host.
    pub fn handle_message(&self, session: &PartySession, message: ClientMessage) -> CommandOutcome {
        let mut inner = session.room.lock();
        if inner.is_closed() {
            return CommandOutcome::RoomClosed;
        }
        let sender = session.participant.id.as_str();
        if !inner.is_host(sender) {
            log::debug!(
                "[Room] Ignoring command from non-host {} in {} (host: {})",
                sender,
                session.room_id(),
                inner.state.host_id
            );
            return CommandOutcome::NotHost;
        }

        let now = self.clock.now_millis();
        match message {
            ClientMessage::UpdateState(patch) => {
                if let Err(reason) = patch.validate() {
                    log::debug!("[Room] Dropping update from {}: {}", sender, reason);
                    return CommandOutcome::Malformed(reason);
                }
                inner.state.apply(&patch, now);
                log_patch(session.room_id(), &patch);
            }
            ClientMessage::TransferHost(payload) => {
                let target = payload.target_user_id;
                if target.is_empty() || !inner.is_member(&target) {
                    log::debug!(
                        "[Room] Ignoring transfer to unknown participant '{}' in {}",
                        target,
                        session.room_id()
                    );
                    return CommandOutcome::UnknownTarget;
                }
                let previous = std::mem::replace(&mut inner.state.host_id, target.clone());
                if previous != target {
                    log::info!(
                        "[Room] Host of {} transferred: {} -> {}",
                        session.room_id(),
                        previous,
                        target
                    );
                    self.emitter.emit_party(PartyEvent::HostChanged {
                        room_id: session.room_id().to_string(),
                        previous_host_id: previous,
                        host_id: target,
                        reason: HostChangeReason::Transfer,
                        timestamp: now,
                    });
                }
            }
        }

        self.broadcaster.broadcast_locked(session.room_id(), &inner);
        CommandOutcome::Applied
    }

    /// Removes the connection from its room.
    ///
    /// Fails host over if needed and broadcasts to the remaining members, or
    /// deletes the room when nobody is left. Calling it twice is harmless.
    pub fn leave(&self, session: &PartySession) -> Departure {
        let room_id = session.room_id();
        let mut inner = session.room.lock();
        if inner.remove(&session.connection_id).is_none() {
            return Departure::default();
        }

        let now = self.clock.now_millis();
        self.emitter.emit_party(PartyEvent::ParticipantLeft {
            room_id: room_id.to_string(),
            participant_id: session.participant.id.clone(),
            connection_id: session.connection_id.clone(),
            timestamp: now,
        });

        if !inner.is_empty() {
            let previous = inner.state.host_id.clone();
            let new_host = inner.fail_over();
            if let Some(host) = &new_host {
                log::info!("[Room] Host of {} failed over: {} -> {}", room_id, previous, host);
                self.emitter.emit_party(PartyEvent::HostChanged {
                    room_id: room_id.to_string(),
                    previous_host_id: previous,
                    host_id: host.clone(),
                    reason: HostChangeReason::Failover,
                    timestamp: now,
                });
            }
            log::info!(
                "[Room] {} left {} (members: {})",
                session.participant.id,
                room_id,
                inner.clients().len()
            );
            self.broadcaster.broadcast_locked(room_id, &inner);
            return Departure {
                new_host,
                room_closed: false,
            };
        }

        // Registry before room: release the room lock first.
        drop(inner);
        let room_closed = self.registry.remove_if_empty(&session.room);
        if room_closed {
            self.emitter.emit_party(PartyEvent::RoomClosed {
                room_id: room_id.to_string(),
                timestamp: now,
            });
        }
        Departure {
            new_host: None,
            room_closed,
        }
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.registry.contains(room_id)
    }

    /// Current snapshot of a room, drift-adjusted to now.
    pub fn snapshot(&self, room_id: &str) -> WatchPartyResult<Snapshot> {
        let room = self
            .registry
            .get(room_id)
            .ok_or_else(|| WatchPartyError::RoomNotFound(room_id.to_string()))?;
        let inner = room.lock();
        Ok(build_snapshot(&inner, self.clock.now_millis()))
    }

    pub fn room_count(&self) -> usize {
        self.registry.len()
    }
}

fn log_patch(room_id: &str, patch: &StatePatch) {
    log::debug!(
        "[Room] {} updated: url={:?} playing={:?} time={:?}",
        room_id,
        patch.url,
        patch.is_playing,
        patch.current_time
    );
}
