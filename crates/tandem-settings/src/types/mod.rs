//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files fill missing fields from [`Default`].

mod endpoint;
mod server;

pub use endpoint::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use tandem_core::constants::DEFAULT_MAX_FRAME_BYTES;

/// Root settings type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TandemSettings {
    /// Settings schema version.
    pub version: String,
    /// Client-side endpoint builder knobs.
    pub endpoint: EndpointSettings,
    /// Server host settings.
    pub server: ServerSettings,
    /// Frame codec settings.
    pub wire: WireSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TandemSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            endpoint: EndpointSettings::default(),
            server: ServerSettings::default(),
            wire: WireSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Frame codec settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireSettings {
    /// Upper bound for one encoded frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for WireSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`info`, `tandem_endpoint=debug`, ...).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
