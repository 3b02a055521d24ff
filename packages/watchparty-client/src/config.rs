//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use watchparty_core::protocol_constants::{
    DEFAULT_BIND_PORT, HOST_HEARTBEAT_INTERVAL_SECS, RECONNECT_DELAY_SECS,
};

use crate::error::{ClientError, ClientResult};

/// Default capacity of the client's outbound command queue.
const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// Configuration for [`SyncClient`](crate::SyncClient) and the host heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the sync server (`http`, `https`, `ws` or `wss`).
    pub server_url: String,

    /// Fixed delay before reconnecting after any closure.
    pub reconnect_delay: Duration,

    /// Commands that may be queued while the socket is busy.
    pub outbound_capacity: usize,

    /// Interval between host position re-broadcasts while playing.
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> ClientResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(ClientError::Configuration("server_url is empty".into()));
        }
        if self.outbound_capacity == 0 {
            return Err(ClientError::Configuration(
                "outbound_capacity must be >= 1".into(),
            ));
        }
        if self.reconnect_delay.is_zero() {
            return Err(ClientError::Configuration(
                "reconnect_delay must be > 0".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ClientError::Configuration(
                "heartbeat_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://localhost:{}", DEFAULT_BIND_PORT),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            heartbeat_interval: Duration::from_secs(HOST_HEARTBEAT_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_url_and_zero_capacity() {
        assert!(ClientConfig::new(" ").validate().is_err());
        let config = ClientConfig {
            outbound_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_reconnect_delay() {
        let config = ClientConfig {
            reconnect_delay: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClientError::Configuration(_))
        ));
    }
}
