//! Process-wide mapping from room id to [`Room`].
//!
//! Rooms are created on first join and removed once empty. Lock order is
//! always registry shard → room mutex; callers must not hold a room guard
//! while calling into the registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::room::Room;
use crate::protocol::ParticipantInfo;

/// Registry of live rooms.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `room_id`, creating it with `first_participant`
    /// as host if it does not exist.
    ///
    /// Concurrent calls for the same id resolve to a single `Room`. The
    /// boolean is `true` when this call created it.
    pub fn get_or_create(
        &self,
        room_id: &str,
        first_participant: &ParticipantInfo,
        now: u64,
    ) -> (Arc<Room>, bool) {
        let (room, created) = match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let room = Arc::new(Room::new(room_id, first_participant.id.clone(), now));
                entry.insert(Arc::clone(&room));
                (room, true)
            }
        };
        // Shard guard is released here; len() would deadlock while holding it.
        if created {
            log::info!(
                "[Room] Created {} (host: {}, total: {})",
                room_id,
                first_participant.id,
                self.rooms.len()
            );
        }
        (room, created)
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    /// Room-existence check used by the join flow.
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Removes a room unconditionally.
    pub fn remove(&self, room_id: &str) -> Option<Arc<Room>> {
        let (_, room) = self.rooms.remove(room_id)?;
        room.close();
        log::info!(
            "[Room] Removed {} (remaining: {})",
            room_id,
            self.rooms.len()
        );
        Some(room)
    }

    /// Removes `room` if it is still the registered instance and has no clients.
    ///
    /// The emptiness check and the removal happen under the registry shard
    /// lock, so a concurrent join either lands before (and the room stays)
    /// or finds the room closed and retries against a fresh one.
    pub fn remove_if_empty(&self, room: &Arc<Room>) -> bool {
        let removed = self
            .rooms
            .remove_if(room.id(), |_, current| {
                Arc::ptr_eq(current, room) && current.close_if_empty()
            })
            .is_some();
        if removed {
            log::info!(
                "[Room] Removed empty room {} (remaining: {})",
                room.id(),
                self.rooms.len()
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
