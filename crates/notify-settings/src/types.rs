//! Settings type definitions.
//!
//! Every section carries `#[serde(default)]`, so a settings file only needs
//! the keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the notification relay.
///
/// ```json
/// {
///   "general": { "host": "0.0.0.0", "port": 8083 },
///   "session": { "queue_capacity": 10, "pong_wait_ms": 5000 },
///   "logging": { "level": "info" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Listener settings.
    pub general: GeneralSettings,
    /// Per-connection queue and keepalive settings.
    pub session: SessionSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listen address of the HTTP/WebSocket server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8083,
        }
    }
}

/// Connection lifecycle tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Capacity of each connection's outbound event queue.
    pub queue_capacity: usize,
    /// Interval between server pings.
    pub ping_period_ms: u64,
    /// A connection with no pong for this long is considered dead.
    pub pong_wait_ms: u64,
    /// Deadline for a single frame write (events and pings).
    pub write_wait_ms: u64,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            ping_period_ms: 1_000,
            pong_wait_ms: 5_000,
            write_wait_ms: 1_000,
            max_message_size: 64 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl NotifySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.queue_capacity must be at least 1".into(),
            ));
        }
        if session.ping_period_ms == 0 || session.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session.ping_period_ms and session.write_wait_ms must be positive".into(),
            ));
        }
        if session.ping_period_ms >= session.pong_wait_ms {
            return Err(SettingsError::InvalidValue(format!(
                "session.ping_period_ms ({}) must be less than session.pong_wait_ms ({})",
                session.ping_period_ms, session.pong_wait_ms
            )));
        }
        if self.general.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("general.host is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_server() {
        let settings = NotifySettings::default();
        assert_eq!(settings.general.host, "0.0.0.0");
        assert_eq!(settings.general.port, 8083);
        assert_eq!(settings.session.queue_capacity, 10);
        assert_eq!(settings.session.ping_period_ms, 1_000);
        assert_eq!(settings.session.pong_wait_ms, 5_000);
        assert_eq!(settings.session.write_wait_ms, 1_000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn defaults_are_valid() {
        NotifySettings::default().validate().unwrap();
    }

    #[test]
    fn partial_section_fills_defaults() {
        let settings: NotifySettings =
            serde_json::from_str(r#"{"general": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.general.port, 9000);
        assert_eq!(settings.general.host, "0.0.0.0");
        assert_eq!(settings.session, SessionSettings::default());
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut settings = NotifySettings::default();
        settings.session.queue_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn ping_period_must_be_below_pong_wait() {
        let mut settings = NotifySettings::default();
        settings.session.ping_period_ms = 5_000;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
        assert!(err.to_string().contains("pong_wait_ms"));
    }

    #[test]
    fn zero_write_wait_rejected() {
        let mut settings = NotifySettings::default();
        settings.session.write_wait_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn blank_host_rejected() {
        let mut settings = NotifySettings::default();
        settings.general.host = "  ".into();
        assert!(settings.validate().is_err());
    }
}
