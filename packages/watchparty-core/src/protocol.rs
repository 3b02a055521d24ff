//! Wire protocol shared by the server and the sync client.
//!
//! Every frame is a JSON text message with a `type` tag and a `data` body:
//!
//! - client → server: `UPDATE_STATE`, `TRANSFER_HOST`
//! - server → client: `STATE_UPDATE`
//!
//! The join handshake is carried in the WebSocket URL query string
//! (see [`JoinParams`]), not as a frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{DEFAULT_USERNAME, MAX_ROOM_ID_LEN};

// ─────────────────────────────────────────────────────────────────────────────
// Participants
// ─────────────────────────────────────────────────────────────────────────────

/// Public identity of a connected participant, as listed in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    /// Stable participant id (survives reconnects).
    pub id: String,
    /// Display name.
    pub username: String,
    /// Avatar hash or URL, if the identity provider supplied one.
    pub avatar: Option<String>,
}

impl ParticipantInfo {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Join Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameters sent when a client opens its WebSocket.
///
/// All fields are optional at the parsing level so a malformed join can be
/// refused with a close frame instead of an HTTP rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    /// Room id (party code).
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Participant id.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Reasons a join handshake is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("missing instanceId")]
    MissingRoomId,
    #[error("missing userId")]
    MissingParticipantId,
    #[error("instanceId longer than {max} bytes")]
    RoomIdTooLong { max: usize },
}

/// A validated join: the room to enter and who is entering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub room_id: String,
    pub participant: ParticipantInfo,
}

impl JoinParams {
    /// Validates the handshake.
    ///
    /// `instanceId` and `userId` must be present and non-blank. A missing
    /// username falls back to [`DEFAULT_USERNAME`]; an empty avatar is
    /// treated as absent.
    pub fn admit(self) -> Result<Admission, AdmissionError> {
        let room_id = non_blank(self.instance_id).ok_or(AdmissionError::MissingRoomId)?;
        if room_id.len() > MAX_ROOM_ID_LEN {
            return Err(AdmissionError::RoomIdTooLong {
                max: MAX_ROOM_ID_LEN,
            });
        }
        let participant_id = non_blank(self.user_id).ok_or(AdmissionError::MissingParticipantId)?;
        let username = non_blank(self.username).unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        Ok(Admission {
            room_id,
            participant: ParticipantInfo {
                id: participant_id,
                username,
                avatar: non_blank(self.avatar),
            },
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// Partial playback state written by the host. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
}

impl StatePatch {
    pub fn position(current_time: f64) -> Self {
        Self {
            current_time: Some(current_time),
            ..Self::default()
        }
    }

    /// Rejects positions that cannot describe a point in a video.
    pub fn validate(&self) -> Result<(), String> {
        match self.current_time {
            Some(t) if !t.is_finite() => Err(format!("currentTime is not finite: {}", t)),
            Some(t) if t < 0.0 => Err(format!("currentTime is negative: {}", t)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHostPayload {
    pub target_user_id: String,
}

/// Commands a client may send. Both are honoured only from the current host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    UpdateState(StatePatch),
    TransferHost(TransferHostPayload),
}

impl ClientMessage {
    pub fn transfer_host(target: impl Into<String>) -> Self {
        Self::TransferHost(TransferHostPayload {
            target_user_id: target.into(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// Room playback state at the moment of a broadcast.
///
/// `current_time` is already extrapolated to the send time for playing rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub url: String,
    pub is_playing: bool,
    pub current_time: f64,
    pub host_id: String,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    StateUpdate(Snapshot),
}

impl ServerMessage {
    /// Serializes the message to its JSON text form.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
