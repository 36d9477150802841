//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a settings file
//! only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the dispatch server.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "session": { "outboundQueueCapacity": 512 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Per-connection session limits and deadlines.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl DispatchSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.outboundQueueCapacity must be at least 1".into(),
            ));
        }
        if s.read_timeout_secs <= s.ping_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "session.readTimeoutSecs ({}) must exceed session.pingIntervalSecs ({})",
                s.read_timeout_secs, s.ping_interval_secs
            )));
        }
        if s.write_timeout_secs == 0 || s.ping_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session write timeout and ping interval must be non-zero".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket sessions.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8081,
            max_connections: 10_000,
        }
    }
}

/// Per-connection limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Capacity of each session's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_bytes: usize,
    /// Read deadline, refreshed on every inbound frame.
    pub read_timeout_secs: u64,
    /// Deadline for each individual write.
    pub write_timeout_secs: u64,
    /// Interval between server-initiated Ping frames.
    pub ping_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            max_message_bytes: 8 * 1024,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            ping_interval_secs: 54,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_documented_values() {
        let s = DispatchSettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8081);
        assert_eq!(s.session.max_message_bytes, 8192);
        assert_eq!(s.session.read_timeout_secs, 60);
        assert_eq!(s.session.write_timeout_secs, 10);
        assert_eq!(s.session.ping_interval_secs, 54);
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
    }

    #[test]
    fn json_uses_camel_case() {
        let json = serde_json::to_value(DispatchSettings::default()).unwrap();
        assert!(json["session"]["outboundQueueCapacity"].is_number());
        assert!(json["server"]["maxConnections"].is_number());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: DispatchSettings =
            serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.session, SessionSettings::default());
    }

    #[test]
    fn read_timeout_must_exceed_ping_interval() {
        let mut s = DispatchSettings::default();
        s.session.read_timeout_secs = 30;
        s.session.ping_interval_secs = 30;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut s = DispatchSettings::default();
        s.session.outbound_queue_capacity = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("outboundQueueCapacity"));
    }
}
