//! Watch Party Core - shared library for synchronized video parties.
//!
//! This crate holds the authoritative side of a watch party: rooms keyed by
//! party code, a single host per room who may change playback state, and a
//! broadcast of drift-adjusted snapshots to every participant. It is used by
//! the standalone server and by the sync client (for the wire protocol).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`]: Wire messages and the join handshake
//! - [`services`]: Rooms, the room registry, broadcast and party logic
//! - [`api`]: Axum router, WebSocket handler and server startup
//! - [`events`]: Party lifecycle events
//! - [`state`]: Core configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`Clock`](clock::Clock): Wall-clock source for drift extrapolation
//! - [`EventEmitter`](events::EventEmitter): Emitting party events
//!
//! Each trait has default implementations suitable for the standalone server.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod error;
pub mod events;
pub mod protocol;
pub mod protocol_constants;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{WatchPartyError, WatchPartyResult};
pub use events::{
    EventEmitter, HostChangeReason, LoggingEventEmitter, NoopEventEmitter, PartyEvent,
};
pub use protocol::{
    Admission, AdmissionError, ClientMessage, JoinParams, ParticipantInfo, ServerMessage,
    Snapshot, StatePatch, TransferHostPayload,
};
pub use state::Config;
pub use utils::now_millis;

// Re-export service types
pub use services::{CommandOutcome, Departure, PartyService, PartySession, RoomRegistry};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with, BootstrappedServices};

// Re-export API types
pub use api::{bind_listener, serve, start_server, AppState, ServerError, WsConnectionManager};
