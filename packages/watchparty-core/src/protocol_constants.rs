//! Fixed protocol constants shared by server and client.
//!
//! Changing these alters observable sync behaviour for every participant,
//! so server and client builds must agree on them.

// ─────────────────────────────────────────────────────────────────────────────
// Synchronization
// ─────────────────────────────────────────────────────────────────────────────

/// Drift (seconds) above which a spectator hard-seeks to the remote position.
///
/// Smaller differences are expected clock skew and are absorbed by local
/// playback to avoid visible micro-seeks.
pub const DRIFT_SEEK_THRESHOLD_SECS: f64 = 2.0;

/// Interval between host position re-broadcasts while playing (seconds).
pub const HOST_HEARTBEAT_INTERVAL_SECS: u64 = 4;

/// Fixed delay before the sync client reconnects after any closure (seconds).
pub const RECONNECT_DELAY_SECS: u64 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Display name used when a join handshake carries no username.
pub const DEFAULT_USERNAME: &str = "Guest";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "watchparty";

// ─────────────────────────────────────────────────────────────────────────────
// Server Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default HTTP/WS port.
pub const DEFAULT_BIND_PORT: u16 = 3000;

/// Capacity of each connection's outbound snapshot queue.
///
/// A client that falls this many snapshots behind starts missing broadcasts;
/// the next snapshot it does receive carries the full state again.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 64;

/// Interval between server pings on each WebSocket (seconds).
pub const DEFAULT_WS_PING_INTERVAL_SECS: u64 = 15;

/// Close a WebSocket after this long without any inbound frame (seconds).
pub const DEFAULT_WS_IDLE_TIMEOUT_SECS: u64 = 45;

/// Longest accepted room id, in bytes.
pub const MAX_ROOM_ID_LEN: usize = 128;
