//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use watchparty_core::Config;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP/WS listener to.
    /// Override: `WATCHPARTY_BIND_ADDRESS`
    pub bind_address: IpAddr,

    /// Port to bind the HTTP/WS listener to.
    /// Override: `WATCHPARTY_BIND_PORT`
    pub bind_port: u16,

    /// Per-connection outbound snapshot queue size.
    pub client_queue_capacity: usize,

    /// Seconds between WebSocket pings.
    /// Override: `WATCHPARTY_WS_PING_INTERVAL`
    pub ws_ping_interval_secs: u64,

    /// Seconds without inbound traffic before a connection is dropped.
    /// Override: `WATCHPARTY_WS_IDLE_TIMEOUT`
    pub ws_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = Config::default();
        Self {
            bind_address: core.bind_address,
            bind_port: core.bind_port,
            client_queue_capacity: core.client_queue_capacity,
            ws_ping_interval_secs: core.ws_ping_interval_secs,
            ws_idle_timeout_secs: core.ws_idle_timeout_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Applies `WATCHPARTY_*` overrides. Unparseable values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("WATCHPARTY_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(ip) = lookup("WATCHPARTY_BIND_ADDRESS").and_then(|v| v.parse().ok()) {
            self.bind_address = ip;
        }

        if let Some(secs) = lookup("WATCHPARTY_WS_PING_INTERVAL").and_then(|v| v.parse().ok()) {
            self.ws_ping_interval_secs = secs;
        }

        if let Some(secs) = lookup("WATCHPARTY_WS_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.ws_idle_timeout_secs = secs;
        }

        // Note: WATCHPARTY_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to watchparty-core's Config type.
    pub fn to_core_config(&self) -> Config {
        Config {
            bind_address: self.bind_address,
            bind_port: self.bind_port,
            client_queue_capacity: self.client_queue_capacity,
            ws_ping_interval_secs: self.ws_ping_interval_secs,
            ws_idle_timeout_secs: self.ws_idle_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_core() {
        assert_eq!(ServerConfig::default().to_core_config(), Config::default());
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = ServerConfig::from_yaml("bind_port: 8080\nws_idle_timeout_secs: 90\n").unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.ws_idle_timeout_secs, 90);
        assert_eq!(config.ws_ping_interval_secs, ServerConfig::default().ws_ping_interval_secs);
    }

    #[test]
    fn env_overrides_win_and_garbage_is_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WATCHPARTY_BIND_PORT", "4000"),
            ("WATCHPARTY_BIND_ADDRESS", "127.0.0.1"),
            ("WATCHPARTY_WS_PING_INTERVAL", "not-a-number"),
        ]);
        let mut config = ServerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 4000);
        assert_eq!(config.bind_address.to_string(), "127.0.0.1");
        assert_eq!(config.ws_ping_interval_secs, ServerConfig::default().ws_ping_interval_secs);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert!(config.to_core_config().validate().is_ok());
    }
}
