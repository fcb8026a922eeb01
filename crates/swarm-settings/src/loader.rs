//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::SwarmSettings;

/// Resolve the path to the settings file (`~/.swarm/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".swarm").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SwarmSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<SwarmSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<SwarmSettings> {
    let defaults = serde_json::to_value(SwarmSettings::default())?;

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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut SwarmSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Invalid values are logged and ignored.
pub fn apply_overrides(settings: &mut SwarmSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Model ───────────────────────────────────────────────────────
    if let Some(v) = read("SWARM_MODEL") {
        settings.model.model = v;
    }
    if let Some(v) = read("OPENROUTER_BASE_URL") {
        settings.model.base_url = v;
    }
    if let Some(v) = parsed(&read, "SWARM_MAX_TOKENS", |s| parse_u64_range(s, 1, 1_000_000)) {
        settings.model.max_tokens = v as u32;
    }
    if let Some(v) = parsed(&read, "SWARM_TEMPERATURE", parse_temperature) {
        settings.model.temperature = v;
    }
    if let Some(v) = parsed(&read, "SWARM_CONTEXT_WINDOW", |s| {
        parse_u64_range(s, 1_000, 10_000_000)
    }) {
        settings.model.context_window_tokens = v as i64;
    }

    // ── Subagents ───────────────────────────────────────────────────
    if let Some(v) = parsed(&read, "SWARM_SUBAGENT_MAX_ITERATIONS", |s| {
        parse_u64_range(s, 1, 1_000)
    }) {
        settings.subagent.max_iterations = v as u32;
    }
    if let Some(v) = parsed(&read, "SWARM_SUBAGENT_MAX_TOTAL_TOKENS", |s| {
        parse_u64_range(s, 1, u64::from(u32::MAX))
    }) {
        settings.subagent.max_total_tokens = v;
    }

    // ── Memory ──────────────────────────────────────────────────────
    if let Some(v) = read("SWARM_MEMORY_DIR") {
        settings.memory.dir = v;
    }
    if let Some(v) = parsed(&read, "SWARM_MEMORY_AUTO_PERSIST", parse_bool) {
        settings.memory.auto_persist = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("SWARM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&read, "SWARM_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

/// Reject values no layer should be able to produce.
pub fn validate(settings: &SwarmSettings) -> Result<()> {
    if !(0.0..=2.0).contains(&settings.model.temperature) {
        return Err(SettingsError::InvalidValue(format!(
            "model.temperature must be within 0..=2, got {}",
            settings.model.temperature
        )));
    }
    if settings.model.context_window_tokens <= 0 {
        return Err(SettingsError::InvalidValue(
            "model.contextWindowTokens must be positive".into(),
        ));
    }
    if settings.subagent.max_iterations == 0 {
        return Err(SettingsError::InvalidValue(
            "subagent.maxIterations must be at least 1".into(),
        ));
    }
    Ok(())
}

fn parsed<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_temperature(val: &str) -> Option<f64> {
    let t: f64 = val.parse().ok()?;
    (0.0..=2.0).contains(&t).then_some(t)
}
