//! Server host settings.

use serde::{Deserialize, Serialize};

/// Network and limit settings for a tandem host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// WebSocket upgrade path.
    pub path: String,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9797,
            path: "/tandem".to_string(),
            max_connections: 256,
        }
    }
}
