//! Snapshot computation and fan-out to a room's clients.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use super::room::{Delivery, RoomInner};
use super::room_registry::RoomRegistry;
use crate::clock::Clock;
use crate::protocol::{ServerMessage, Snapshot};

/// Builds the snapshot of a room as seen at `now`.
pub fn build_snapshot(room: &RoomInner, now: u64) -> Snapshot {
    Snapshot {
        url: room.state.url.clone(),
        is_playing: room.state.is_playing,
        current_time: room.state.position_at(now),
        host_id: room.state.host_id.clone(),
        participants: room.participants(),
    }
}

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Clients whose queue was full or already closed.
    pub skipped: usize,
}

/// Pushes `STATE_UPDATE` snapshots to every client of a room.
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
    clock: Arc<dyn Clock>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Broadcasts the current state of `room_id`. No-op if the room is absent.
    pub fn broadcast(&self, room_id: &str) -> Option<BroadcastReport> {
        let room = self.registry.get(room_id)?;
        let inner = room.lock();
        Some(self.broadcast_locked(room_id, &inner))
    }

    /// Broadcasts from an already-held room guard.
    ///
    /// Callers pass the guard they mutated under, so the snapshot reflects
    /// exactly that mutation and no later one can be sent ahead of it.
    pub fn broadcast_locked(&self, room_id: &str, room: &RoomInner) -> BroadcastReport {
        let snapshot = build_snapshot(room, self.clock.now_millis());
        let frame: Utf8Bytes = match ServerMessage::StateUpdate(snapshot).to_text() {
            Ok(text) => text.into(),
            Err(e) => {
                log::error!("[Room] Failed to serialize snapshot for {}: {}", room_id, e);
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for client in room.clients() {
            match client.try_deliver(frame.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Lagging => {
                    log::warn!(
                        "[Room] {} lagging in {}, snapshot skipped",
                        client.connection_id(),
                        room_id
                    );
                    report.skipped += 1;
                }
                Delivery::Closed => report.skipped += 1,
            }
        }
        log::trace!(
            "[Room] Broadcast {}: delivered={}, skipped={}",
            room_id,
            report.delivered,
            report.skipped
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::ParticipantInfo;
    use crate::services::room::ClientHandle;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<RoomRegistry>, Arc<ManualClock>, Broadcaster) {
        let registry = Arc::new(RoomRegistry::new());
        let clock = Arc::new(ManualClock::new(100_000));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), clock.clone());
        (registry, clock, broadcaster)
    }

    fn decode(frame: &Utf8Bytes) -> Snapshot {
        match serde_json::from_str::<ServerMessage>(frame.as_str()).unwrap() {
            ServerMessage::StateUpdate(snapshot) => snapshot,
        }
    }

    #[test]
    fn broadcast_to_absent_room_is_noop() {
        let (_, _, broadcaster) = setup();
        assert_eq!(broadcaster.broadcast("nope"), None);
    }

    #[test]
    fn playing_room_extrapolates_position() {
        let (registry, clock, broadcaster) = setup();
        let alice = ParticipantInfo::new("a", "alice");
        let (room, _) = registry.get_or_create("ABCD", &alice, clock.now_millis());
        let (tx, mut rx) = mpsc::channel(4);
        {
            let mut inner = room.lock();
            inner.admit(ClientHandle::new("ws-1", alice, tx), clock.now_millis());
            inner.state.is_playing = true;
            inner.state.current_time = 10.0;
            inner.state.last_updated = clock.now_millis();
        }

        clock.advance(Duration::from_millis(7_250));
        broadcaster.broadcast("ABCD");

        let snapshot = decode(&rx.try_recv().unwrap());
        assert!((snapshot.current_time - 17.25).abs() < 1e-9);
    }

    #[test]
    fn paused_room_reports_stored_position() {
        let (registry, clock, broadcaster) = setup();
        let alice = ParticipantInfo::new("a", "alice");
        let (room, _) = registry.get_or_create("ABCD", &alice, clock.now_millis());
        let (tx, mut rx) = mpsc::channel(4);
        {
            let mut inner = room.lock();
            inner.admit(ClientHandle::new("ws-1", alice, tx), clock.now_millis());
            inner.state.current_time = 10.0;
        }

        clock.advance(Duration::from_secs(600));
        broadcaster.broadcast("ABCD");

        assert_eq!(decode(&rx.try_recv().unwrap()).current_time, 10.0);
    }

    #[test]
    fn identical_frame_reaches_every_client_and_dead_ones_are_skipped() {
        let (registry, clock, broadcaster) = setup();
        let alice = ParticipantInfo::new("a", "alice");
        let bob = ParticipantInfo::new("b", "bob");
        let carol = ParticipantInfo::new("c", "carol");
        let (room, _) = registry.get_or_create("ABCD", &alice, clock.now_millis());

        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let (tx_c, rx_c) = mpsc::channel(4);
        {
            let mut inner = room.lock();
            inner.admit(ClientHandle::new("ws-1", alice, tx_a), 0);
            inner.admit(ClientHandle::new("ws-2", bob, tx_b), 0);
            inner.admit(ClientHandle::new("ws-3", carol, tx_c), 0);
        }
        drop(rx_c);

        let report = broadcaster.broadcast("ABCD").unwrap();
        assert_eq!(
            report,
            BroadcastReport {
                delivered: 2,
                skipped: 1
            }
        );

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert_eq!(a.as_str(), b.as_str());

        let snapshot = decode(&a);
        assert_eq!(snapshot.host_id, "a");
        let ids: Vec<_> = snapshot.participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn full_queue_does_not_block_other_clients() {
        let (registry, clock, broadcaster) = setup();
        let alice = ParticipantInfo::new("a", "alice");
        let bob = ParticipantInfo::new("b", "bob");
        let (room, _) = registry.get_or_create("ABCD", &alice, clock.now_millis());

        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        {
            let mut inner = room.lock();
            inner.admit(ClientHandle::new("ws-1", alice, tx_a), 0);
            inner.admit(ClientHandle::new("ws-2", bob, tx_b), 0);
        }

        for _ in 0..3 {
            broadcaster.broadcast("ABCD");
        }

        let mut received = 0;
        while rx_b.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }
}
