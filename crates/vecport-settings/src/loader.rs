//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`VecportSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `VECPORT_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::VecportSettings;

/// Resolve the path to the settings file (`~/.vecport/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vecport").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<VecportSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<VecportSettings> {
    let defaults = serde_json::to_value(VecportSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: VecportSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
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
pub fn apply_env_overrides(settings: &mut VecportSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (an environment stand-in).
///
/// Empty strings are treated as unset. Out-of-range numbers are ignored with
/// a warning, falling back to the file/default value.
pub fn apply_overrides_from<F>(settings: &mut VecportSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read_string("VECPORT_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Export settings ─────────────────────────────────────────────
    if let Some(v) = read_string("VECPORT_MODEL_ID") {
        settings.export.model_id = v;
    }
    if let Some(v) = read_string("VECPORT_CACHE_DIR") {
        settings.export.cache_dir = v;
    }
    if let Some(raw) = read_string("VECPORT_MAX_SEQ_LENGTH") {
        match parse_usize_range(&raw, 1, 8192) {
            Some(v) => settings.export.max_seq_length = v,
            None => {
                tracing::warn!(key = "VECPORT_MAX_SEQ_LENGTH", value = %raw, "invalid usize env var, ignoring");
            }
        }
    }

    // ── Visualize settings ──────────────────────────────────────────
    if let Some(v) = read_string("VECPORT_DB_PATH") {
        settings.visualize.database_path = v;
    }
    if let Some(v) = read_string("VECPORT_PLOT_OUTPUT") {
        settings.visualize.output_path = v;
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
