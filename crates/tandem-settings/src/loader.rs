//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TandemSettings::default()`]
//! 2. If `~/.tandem/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TANDEM_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TandemSettings;

/// Resolve the path to the settings file (`~/.tandem/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tandem").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TandemSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TandemSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file(path: &Path) -> Result<TandemSettings> {
    let defaults = serde_json::to_value(TandemSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TANDEM_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TandemSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `TANDEM_*` overrides from an arbitrary lookup.
///
/// Empty values are ignored. Numbers must parse and sit within range;
/// anything else is ignored with a `warn!`.
pub fn apply_overrides(settings: &mut TandemSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Endpoint ────────────────────────────────────────────────────
    if let Some(v) = env.string("TANDEM_URL") {
        settings.endpoint.url = Some(v);
    }
    if let Some(v) = env.string("TANDEM_PROTOCOL") {
        settings.endpoint.protocol = Some(v);
    }
    if let Some(v) = env.string("TANDEM_HOSTNAME") {
        settings.endpoint.hostname = Some(v);
    }
    if let Some(v) = env.u16("TANDEM_PORT", 1, 65535) {
        settings.endpoint.port = Some(v);
    }
    if let Some(v) = env.string("TANDEM_PATH") {
        settings.endpoint.path = Some(v);
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TANDEM_SERVER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TANDEM_SERVER_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("TANDEM_SERVER_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.usize("TANDEM_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── Wire / logging ──────────────────────────────────────────────
    if let Some(v) = env.usize("TANDEM_MAX_FRAME_BYTES", 64, 1 << 30) {
        settings.wire.max_frame_bytes = v;
    }
    if let Some(v) = env.string("TANDEM_LOG") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TANDEM_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Lookup readers ──────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
