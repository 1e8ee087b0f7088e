//! Settings loading: compiled defaults, optional JSON file, env overrides.

use std::env;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LogLevel, VigilSettings};

const MAX_MESSAGE_SIZE_FLOOR: usize = 1024;
const MAX_MESSAGE_SIZE_CEIL: usize = 16 * 1024 * 1024;

/// Directory that holds the settings file and the default database.
pub fn vigil_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vigil")
}

/// Path to the settings file.
pub fn settings_path() -> PathBuf {
    vigil_dir().join("settings.json")
}

/// Load settings from the default location.
pub fn load_settings() -> Result<VigilSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from an explicit path.
///
/// Starts from compiled defaults, deep-merges the file contents on top if the
/// file exists, then applies `VIGIL_*` environment overrides. A missing or
/// empty file yields defaults; malformed JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<VigilSettings> {
    let mut merged = serde_json::to_value(VigilSettings::default())?;

    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        if !raw.trim().is_empty() {
            let overlay: Value = serde_json::from_str(&raw)?;
            deep_merge(&mut merged, overlay);
            debug!(path = %path.display(), "loaded settings file");
        }
    }

    apply_env_overrides(&mut merged);

    Ok(serde_json::from_value(merged)?)
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; everything else (scalars, arrays, null)
/// replaces the base value wholesale.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

fn apply_env_overrides(settings: &mut Value) {
    if let Some(host) = read_env_string("VIGIL_HOST") {
        settings["server"]["host"] = Value::String(host);
    }
    if let Some(port) = read_env_u16("VIGIL_PORT", 1, u16::MAX) {
        settings["server"]["port"] = Value::from(port);
    }
    if let Some(interval) = read_env_u64("VIGIL_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings["server"]["heartbeatIntervalSecs"] = Value::from(interval);
    }
    if let Some(timeout) = read_env_u64("VIGIL_HEARTBEAT_TIMEOUT_SECS", 1, 7200) {
        settings["server"]["heartbeatTimeoutSecs"] = Value::from(timeout);
    }
    if let Some(size) =
        read_env_usize("VIGIL_MAX_MESSAGE_SIZE", MAX_MESSAGE_SIZE_FLOOR, MAX_MESSAGE_SIZE_CEIL)
    {
        settings["server"]["maxMessageSize"] = Value::from(size);
    }
    if let Some(secret) = read_env_string("VIGIL_TOKEN_SECRET") {
        settings["auth"]["tokenSecret"] = Value::String(secret);
    }
    if let Some(path) = read_env_string("VIGIL_DB_PATH") {
        settings["database"]["path"] = Value::String(path);
    }
    if let Some(level) = read_env_log_level("VIGIL_DB_LOG_LEVEL") {
        settings["logging"]["dbLogLevel"] = level;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_u16_range(raw: &str, min: u16, max: u16) -> Option<u16> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_u64_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_usize_range(raw: &str, min: usize, max: usize) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let raw = env::var(name).ok()?;
    let parsed = parse_u16_range(&raw, min, max);
    if parsed.is_none() {
        warn!(var = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = env::var(name).ok()?;
    let parsed = parse_u64_range(&raw, min, max);
    if parsed.is_none() {
        warn!(var = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let raw = env::var(name).ok()?;
    let parsed = parse_usize_range(&raw, min, max);
    if parsed.is_none() {
        warn!(var = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

fn read_env_log_level(name: &str) -> Option<Value> {
    let raw = env::var(name).ok()?;
    let candidate = Value::String(raw.trim().to_lowercase());
    if serde_json::from_value::<LogLevel>(candidate.clone()).is_ok() {
        Some(candidate)
    } else {
        warn!(var = name, value = %raw, "ignoring invalid environment override");
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
