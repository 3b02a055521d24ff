//! Watch Party Client - participant side of a synchronized video party.
//!
//! - [`SyncClient`]: reconnecting WebSocket link to the sync server
//! - [`PlaybackCoordinator`]: merges snapshots into the local player and
//!   turns host actions into commands
//! - [`PartyDirectory`]: party codes and the existence check
//! - [`WatchSession`]: the three wired together for one participant

#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod session;
pub mod sync_client;

pub use config::ClientConfig;
pub use coordinator::{
    spawn_host_heartbeat, LocalVideoState, PlaybackCoordinator, PlayerCommand, Reconciled,
    VideoAdapter,
};
pub use directory::{PartyCode, PartyDirectory, PARTY_CODE_LEN};
pub use error::{ClientError, ClientResult};
pub use session::{SessionCoordinator, WatchSession};
pub use sync_client::{
    build_ws_url, ConnectionState, JoinMetadata, SnapshotCallback, StateSink, SyncClient,
};
