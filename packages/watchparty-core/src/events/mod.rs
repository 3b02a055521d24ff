//! Party lifecycle events.
//!
//! Services report room and membership changes through an [`EventEmitter`]
//! rather than logging or notifying directly, so embedders can observe a
//! party without touching the WebSocket path.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Why the host role moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HostChangeReason {
    /// The previous host handed the role over with `TRANSFER_HOST`.
    Transfer,
    /// The previous host's last connection closed.
    Failover,
}

/// Room and membership lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PartyEvent {
    /// First join created the room.
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "hostId")]
        host_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The last connection left and the room was deleted.
    RoomClosed {
        #[serde(rename = "roomId")]
        room_id: String,
        timestamp: u64,
    },
    ParticipantJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "participantId")]
        participant_id: String,
        #[serde(rename = "connectionId")]
        connection_id: String,
        timestamp: u64,
    },
    ParticipantLeft {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "participantId")]
        participant_id: String,
        #[serde(rename = "connectionId")]
        connection_id: String,
        timestamp: u64,
    },
    HostChanged {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "previousHostId")]
        previous_host_id: String,
        #[serde(rename = "hostId")]
        host_id: String,
        reason: HostChangeReason,
        timestamp: u64,
    },
}

impl PartyEvent {
    /// Room the event belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Self::RoomCreated { room_id, .. }
            | Self::RoomClosed { room_id, .. }
            | Self::ParticipantJoined { room_id, .. }
            | Self::ParticipantLeft { room_id, .. }
            | Self::HostChanged { room_id, .. } => room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_changed_serializes_camel_case() {
        let event = PartyEvent::HostChanged {
            room_id: "ABCD".into(),
            previous_host_id: "a".into(),
            host_id: "b".into(),
            reason: HostChangeReason::Failover,
            timestamp: 7,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "hostChanged");
        assert_eq!(value["previousHostId"], "a");
        assert_eq!(value["reason"], "failover");
        assert_eq!(event.room_id(), "ABCD");
    }
}
