//! Core configuration types.
//!
//! [`Config`] carries everything the server core needs at runtime. The
//! headless server builds it from YAML, environment and CLI flags; embedders
//! can construct it directly.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{WatchPartyError, WatchPartyResult};
use crate::protocol_constants::{
    DEFAULT_BIND_PORT, DEFAULT_CLIENT_QUEUE_CAPACITY, DEFAULT_WS_IDLE_TIMEOUT_SECS,
    DEFAULT_WS_PING_INTERVAL_SECS,
};

/// Configuration for the Watch Party server core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Address the HTTP/WS listener binds to.
    pub bind_address: IpAddr,

    /// Port for the HTTP/WS listener (0 = ephemeral).
    pub bind_port: u16,

    // WebSocket
    /// Capacity of each connection's outbound snapshot queue.
    pub client_queue_capacity: usize,

    /// Interval between server pings on each WebSocket (seconds).
    pub ws_ping_interval_secs: u64,

    /// Close a WebSocket after this long without an inbound frame (seconds).
    pub ws_idle_timeout_secs: u64,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> WatchPartyResult<()> {
        if self.client_queue_capacity == 0 {
            return Err(WatchPartyError::Configuration(
                "client_queue_capacity must be >= 1".to_string(),
            ));
        }
        if self.ws_ping_interval_secs == 0 {
            return Err(WatchPartyError::Configuration(
                "ws_ping_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.ws_idle_timeout_secs < self.ws_ping_interval_secs {
            return Err(WatchPartyError::Configuration(format!(
                "ws_idle_timeout_secs ({}) must be >= ws_ping_interval_secs ({})",
                self.ws_idle_timeout_secs, self.ws_ping_interval_secs
            )));
        }
        Ok(())
    }

    /// Socket address the server listens on.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.bind_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: DEFAULT_BIND_PORT,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            ws_ping_interval_secs: DEFAULT_WS_PING_INTERVAL_SECS,
            ws_idle_timeout_secs: DEFAULT_WS_IDLE_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn config_rejects_zero_values() {
        let config = Config {
            client_queue_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            ws_ping_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WatchPartyError::Configuration(_))
        ));
    }

    #[test]
    fn config_rejects_timeout_shorter_than_ping() {
        let config = Config {
            ws_ping_interval_secs: 30,
            ws_idle_timeout_secs: 10,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: Config = serde_json::from_str(r#"{"bind_port": 8080}"#).unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.client_queue_capacity, DEFAULT_CLIENT_QUEUE_CAPACITY);
    }
}
