//! Server configuration.

use std::time::Duration;

use drivrr_settings::DispatchSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the dispatch server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket sessions.
    pub max_connections: usize,
    /// Bounded capacity of each session's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Read deadline in seconds, refreshed on every received frame.
    pub read_timeout_secs: u64,
    /// Per-write deadline in seconds.
    pub write_timeout_secs: u64,
    /// Interval between liveness pings in seconds.
    pub ping_interval_secs: u64,
}

impl ServerConfig {
    /// Build a config from loaded settings.
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            outbound_queue_capacity: settings.session.outbound_queue_capacity,
            max_message_size: settings.session.max_message_bytes,
            read_timeout_secs: settings.session.read_timeout_secs,
            write_timeout_secs: settings.session.write_timeout_secs,
            ping_interval_secs: settings.session.ping_interval_secs,
        }
    }

    /// Session timing derived from the config.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            queue_capacity: self.outbound_queue_capacity.max(1),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            outbound_queue_capacity: 256,
            max_message_size: 8 * 1024,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            ping_interval_secs: 54,
        }
    }
}

/// Deadlines and capacities one session runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Max silence on the read side before the session is torn down.
    pub read_timeout: Duration,
    /// Max time a single write may take.
    pub write_timeout: Duration,
    /// Liveness ping cadence.
    pub ping_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_queue_capacity() {
        assert_eq!(ServerConfig::default().outbound_queue_capacity, 256);
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = DispatchSettings::default();
        settings.server.host = "10.0.0.1".into();
        settings.server.port = 3000;
        settings.server.max_connections = 5;
        settings.session.outbound_queue_capacity = 8;
        settings.session.max_message_bytes = 1024;
        settings.session.read_timeout_secs = 20;
        settings.session.write_timeout_secs = 2;
        settings.session.ping_interval_secs = 15;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.outbound_queue_capacity, 8);
        assert_eq!(cfg.max_message_size, 1024);
        assert_eq!(cfg.read_timeout_secs, 20);
        assert_eq!(cfg.write_timeout_secs, 2);
        assert_eq!(cfg.ping_interval_secs, 15);
    }

    #[test]
    fn session_limits_convert_to_durations() {
        let limits = ServerConfig::default().session_limits();
        assert_eq!(limits.queue_capacity, 256);
        assert_eq!(limits.read_timeout, Duration::from_secs(60));
        assert_eq!(limits.write_timeout, Duration::from_secs(10));
        assert_eq!(limits.ping_interval, Duration::from_secs(54));
    }

    #[test]
    fn zero_capacity_clamped() {
        let cfg = ServerConfig {
            outbound_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.session_limits().queue_capacity, 1);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"max_connections":5,"outbound_queue_capacity":4,"max_message_size":512,"read_timeout_secs":30,"write_timeout_secs":5,"ping_interval_secs":20}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.outbound_queue_capacity, 4);
    }
}
