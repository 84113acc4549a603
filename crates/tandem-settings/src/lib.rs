//! # tandem-settings
//!
//! Layered configuration for tandem endpoints and hosts.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TandemSettings::default()`]
//! 2. **User file**: `~/.tandem/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TANDEM_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<TandemSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads `~/.tandem/settings.json` with env var overrides,
/// falling back to compiled defaults if loading fails. Later calls return
/// the cached value.
pub fn get_settings() -> &'static TandemSettings {
    SETTINGS.get_or_init(|| match load_settings() {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(%error, "failed to load settings, using defaults");
            TandemSettings::default()
        }
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TandemSettings) -> std::result::Result<(), TandemSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
