//! Application services layer.
//!
//! This module contains the room model and the party logic that the API
//! layer delegates to.

pub mod broadcast;
pub mod party_service;
pub mod room;
pub mod room_registry;

pub use broadcast::{build_snapshot, BroadcastReport, Broadcaster};
pub use party_service::{CommandOutcome, Departure, PartyService, PartySession};
pub use room::{Admitted, ClientHandle, Delivery, Room, RoomInner, RoomState};
pub use room_registry::RoomRegistry;
