//! Runtime configuration of the server and its connections.

use std::time::Duration;

use notify_settings::NotifySettings;

/// Configuration for the notification server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Largest inbound `WebSocket` message accepted, in bytes.
    pub max_message_size: usize,
    /// Per-connection settings.
    pub session: SessionConfig,
}

/// Queue and keepalive settings applied to every connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Capacity of the outbound event queue.
    pub queue_capacity: usize,
    /// Interval between pings.
    pub ping_period: Duration,
    /// Connection is dead when no pong arrived for this long.
    pub pong_wait: Duration,
    /// Deadline for each frame write.
    pub write_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024,
            session: SessionConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            ping_period: Duration::from_secs(1),
            pong_wait: Duration::from_secs(5),
            write_wait: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Build the runtime config from loaded settings.
    pub fn from_settings(settings: &NotifySettings) -> Self {
        let session = &settings.session;
        Self {
            host: settings.general.host.clone(),
            port: settings.general.port,
            max_message_size: session.max_message_size,
            session: SessionConfig {
                queue_capacity: session.queue_capacity,
                ping_period: Duration::from_millis(session.ping_period_ms),
                pong_wait: Duration::from_millis(session.pong_wait_ms),
                write_wait: Duration::from_millis(session.write_wait_ms),
            },
        }
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
