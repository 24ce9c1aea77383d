//! # notify-server
//!
//! Real-time push relay for repository change notifications.
//!
//! - Producers `POST /events`; the event is resolved to a repository topic
//!   and fanned out to every subscribed connection
//! - Clients connect with a `WebSocket` on `/` and send `subscribe` /
//!   `unsubscribe` commands
//! - Each connection runs a read loop, a write loop draining a bounded queue,
//!   and a keepalive loop; whichever fails first triggers a single teardown
//! - [`hub::NotificationHub`] owns all process-wide state (connection
//!   registry, subscription index, dispatcher)

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod subscription;
pub mod websocket;
