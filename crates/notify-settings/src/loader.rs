//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`NotifySettings::default()`]
//! 2. If `<config-dir>/notification.json` exists, deep-merge it over defaults
//! 3. Apply `NOTIFY_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::NotifySettings;

/// File name of the settings file inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "notification.json";

/// Resolve the settings file inside `config_dir`.
pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

/// Load settings from `<config_dir>/notification.json` with env var overrides.
pub fn load_settings(config_dir: &Path) -> Result<NotifySettings> {
    load_settings_from_path(&settings_path(config_dir))
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. An unreadable file, invalid JSON, or a
/// value that fails [`NotifySettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NotifySettings> {
    let mut settings = read_layered(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<NotifySettings> {
    let defaults = serde_json::to_value(NotifySettings::default())?;

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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `NOTIFY_*` overrides read through `lookup`.
///
/// Empty values are ignored; malformed or out-of-range values are ignored
/// with a warning.
pub fn apply_overrides<F>(settings: &mut NotifySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("NOTIFY_HOST") {
        settings.general.host = v;
    }
    if let Some(v) = read("NOTIFY_PORT") {
        match parse_u16_range(&v, 1, u16::MAX) {
            Some(port) => settings.general.port = port,
            None => warn!(key = "NOTIFY_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("NOTIFY_QUEUE_CAPACITY") {
        match parse_usize_range(&v, 1, 10_000) {
            Some(capacity) => settings.session.queue_capacity = capacity,
            None => {
                warn!(key = "NOTIFY_QUEUE_CAPACITY", value = %v, "invalid queue capacity env var, ignoring");
            }
        }
    }
    if let Some(v) = read("NOTIFY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
