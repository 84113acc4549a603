//! Server configuration.

use serde::{Deserialize, Serialize};
use tandem_core::constants::{DEFAULT_MAX_FRAME_BYTES, SENTINEL};
use tandem_settings::TandemSettings;

/// Configuration for a tandem host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// WebSocket upgrade path (default `"/tandem"`).
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Upper bound for one encoded frame body, in bytes.
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    /// Config from loaded settings (`server` and `wire` sections).
    pub fn from_settings(settings: &TandemSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            path: normalize_path(&settings.server.path),
            max_connections: settings.server.max_connections,
            max_frame_bytes: settings.wire.max_frame_bytes,
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Largest WebSocket message accepted: one frame body plus its sentinel.
pub(crate) fn max_message_size(max_frame_bytes: usize) -> usize {
    max_frame_bytes.saturating_add(SENTINEL.len())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/tandem".into(),
            max_connections: 256,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Routes must start with `/`.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
