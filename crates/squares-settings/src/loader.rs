//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SquaresSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SQUARES_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::SquaresSettings;

/// Resolve the path to the settings file (`~/.squares/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".squares").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SquaresSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SquaresSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the settings file (no env layer).
fn read_file_layer(path: &Path) -> Result<SquaresSettings> {
    let defaults = serde_json::to_value(SquaresSettings::default())?;

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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SquaresSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (the env in production).
fn apply_overrides(settings: &mut SquaresSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let number = |name: &str, min: u64, max: u64| -> Option<u64> {
        let raw = lookup(name)?;
        let result = parse_u64_range(&raw, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %raw, "invalid numeric env var, ignoring");
        }
        result
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("SQUARES_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = number("SQUARES_PORT", 0, 65_535) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = number("SQUARES_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = usize::try_from(v).unwrap_or(settings.server.max_connections);
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = number("SQUARES_PING_INTERVAL_SECS", 1, 3_600) {
        settings.realtime.ping_interval_secs = v;
    }
    if let Some(v) = number("SQUARES_PONG_WAIT_SECS", 2, 7_200) {
        settings.realtime.pong_wait_secs = v;
    }
    if let Some(v) = number("SQUARES_REVALIDATE_INTERVAL_SECS", 1, 86_400) {
        settings.realtime.revalidate_interval_secs = v;
    }
    if let Some(raw) = lookup("SQUARES_KEEPALIVE_ENVELOPES") {
        match parse_bool(&raw) {
            Some(v) => settings.realtime.keepalive_envelopes = v,
            None => tracing::warn!(key = "SQUARES_KEEPALIVE_ENVELOPES", value = %raw, "invalid boolean env var, ignoring"),
        }
    }

    if let Some(v) = string("SQUARES_BUS_URL") {
        settings.realtime.bus_url = Some(v);
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = string("SQUARES_JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = string("SQUARES_JWT_ISSUER") {
        settings.auth.issuer = Some(v);
    }
    if let Some(v) = string("SQUARES_JWT_AUDIENCE") {
        settings.auth.audience = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("SQUARES_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = lookup("SQUARES_LOG_JSON") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.json = v,
            None => tracing::warn!(key = "SQUARES_LOG_JSON", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
