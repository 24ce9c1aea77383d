//! Ping/pong liveness monitoring.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::session::Session;
use crate::errors::TransportError;

/// Why the keepalive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// No pong within the allowed window.
    TimedOut,
    /// A ping could not be written.
    PingFailed,
    /// The session was torn down elsewhere.
    Closed,
}

/// Ping every `period` until the session closes or goes quiet.
///
/// Before each ping the time since the last pong is checked; past
/// `pong_wait` the client is considered dead.
pub async fn run_keepalive<P, Fut>(
    session: &Session,
    period: Duration,
    pong_wait: Duration,
    mut ping: P,
) -> KeepaliveResult
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = session.closed() => return KeepaliveResult::Closed,
            _ = ticker.tick() => {
                let silent_for = session.last_pong_elapsed();
                if silent_for > pong_wait {
                    info!(session_id = session.id(), ?silent_for, "keepalive timed out");
                    return KeepaliveResult::TimedOut;
                }
                if let Err(e) = ping().await {
                    debug!(session_id = session.id(), error = %e, "ping failed");
                    return KeepaliveResult::PingFailed;
                }
            }
        }
    }
}
