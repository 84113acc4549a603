//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: &'static str,
    /// Interface served on the WebSocket path.
    pub interface: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connection limit.
    pub max_connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    interface: &str,
    start_time: Instant,
    connections: usize,
    max_connections: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        interface: interface.to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        max_connections,
    }
}
