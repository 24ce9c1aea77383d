//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Live `WebSocket` connections.
    pub connections: usize,
    /// Repositories with at least one subscriber.
    pub topics: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, topics: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        topics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_server_is_ok() {
        let resp = health_check(Instant::now(), 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(90))
            .unwrap();
        assert!(health_check(start, 0, 0).uptime_secs >= 89);
    }

    #[test]
    fn serializes_counters() {
        let resp = health_check(Instant::now(), 4, 2);
        let parsed: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 4);
        assert_eq!(parsed["topics"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}
