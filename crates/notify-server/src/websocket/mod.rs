//! `WebSocket` connections.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | Per-connection state: id, outbound queue, topics, lifecycle |
//! | `connection` | Upgrade handling and the read and write loops |
//! | `keepalive` | Periodic pings and pong-deadline enforcement |
//!
//! Each connection runs three loops. Whichever ends first tears the session
//! down through the hub, and the other two observe the close and exit.

pub mod connection;
pub mod keepalive;
pub mod session;
