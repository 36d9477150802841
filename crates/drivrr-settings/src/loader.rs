//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DispatchSettings::default()`]
//! 2. If `~/.drivrr/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `DRIVRR_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::DispatchSettings;

/// Resolve the path to the settings file (`~/.drivrr/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".drivrr").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DispatchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DispatchSettings> {
    let defaults = serde_json::to_value(DispatchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: DispatchSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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
pub fn apply_env_overrides(settings: &mut DispatchSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup, so tests need not touch the
/// process environment.
fn apply_overrides_from(settings: &mut DispatchSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let parsed = |name: &str, parse: &dyn Fn(&str) -> Option<u64>| {
        let val = lookup(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("DRIVRR_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = parsed("DRIVRR_PORT", &|s| parse_u64_range(s, 0, 65_535)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = parsed("DRIVRR_MAX_CONNECTIONS", &|s| parse_u64_range(s, 1, 1_000_000)) {
        settings.server.max_connections = usize::try_from(v).unwrap_or(settings.server.max_connections);
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = parsed("DRIVRR_QUEUE_CAPACITY", &|s| parse_u64_range(s, 1, 65_536)) {
        settings.session.outbound_queue_capacity =
            usize::try_from(v).unwrap_or(settings.session.outbound_queue_capacity);
    }
    if let Some(v) = parsed("DRIVRR_MAX_MESSAGE_BYTES", &|s| parse_u64_range(s, 64, 16 * 1024 * 1024)) {
        settings.session.max_message_bytes =
            usize::try_from(v).unwrap_or(settings.session.max_message_bytes);
    }
    if let Some(v) = parsed("DRIVRR_READ_TIMEOUT_SECS", &|s| parse_u64_range(s, 1, 3_600)) {
        settings.session.read_timeout_secs = v;
    }
    if let Some(v) = parsed("DRIVRR_WRITE_TIMEOUT_SECS", &|s| parse_u64_range(s, 1, 600)) {
        settings.session.write_timeout_secs = v;
    }
    if let Some(v) = parsed("DRIVRR_PING_INTERVAL_SECS", &|s| parse_u64_range(s, 1, 3_600)) {
        settings.session.ping_interval_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("DRIVRR_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(val) = lookup("DRIVRR_LOG_JSON") {
        match parse_bool(&val) {
            Some(v) => settings.logging.json = v,
            None => tracing::warn!(key = "DRIVRR_LOG_JSON", value = %val, "invalid boolean env var, ignoring"),
        }
    }
}

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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
