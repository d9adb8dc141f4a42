//! Config loader — reads `~/.switchboard/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.switchboard/config.json`
//! 3. Environment variables `SWITCHBOARD_<SECTION>__<FIELD>` (override JSON)
//! 4. Vendor key variables (`GROQ_API_KEY`, …) for providers still without a key

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `SWITCHBOARD_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `SWITCHBOARD_PROVIDERS__<NAME>__API_KEY` → `providers[name].api_key`
/// - `SWITCHBOARD_PROVIDERS__<NAME>__API_BASE` → `providers[name].api_base`
/// - `SWITCHBOARD_ROUTER__MAX_ATTEMPTS` → `router.max_attempts_per_provider`
/// - `SWITCHBOARD_ROUTER__RETRY_DELAY_MS` → `router.retry_delay_ms`
/// - `SWITCHBOARD_HEALTH__ENABLED` → `health.enabled`
/// - `SWITCHBOARD_HEALTH__INTERVAL_S` → `health.interval_s`
fn apply_env_overrides(mut config: Config) -> Config {
    for provider in &mut config.providers {
        let name = provider.name.to_uppercase().replace('-', "_");
        if let Ok(val) = std::env::var(format!("SWITCHBOARD_PROVIDERS__{name}__API_KEY")) {
            provider.api_key = val;
        }
        if let Ok(val) = std::env::var(format!("SWITCHBOARD_PROVIDERS__{name}__API_BASE")) {
            provider.api_base = val;
        }
        if provider.api_key.is_empty() {
            if let Ok(val) = std::env::var(format!("{name}_API_KEY")) {
                debug!(provider = %provider.name, "using {name}_API_KEY from environment");
                provider.api_key = val;
            }
        }
    }

    if let Ok(val) = std::env::var("SWITCHBOARD_ROUTER__MAX_ATTEMPTS") {
        if let Ok(n) = val.parse::<u32>() {
            config.router.max_attempts_per_provider = n;
        }
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_ROUTER__RETRY_DELAY_MS") {
        if let Ok(n) = val.parse::<u64>() {
            config.router.retry_delay_ms = n;
        }
    }

    if let Ok(val) = std::env::var("SWITCHBOARD_HEALTH__ENABLED") {
        config.health.enabled = val == "true" || val == "1";
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_HEALTH__INTERVAL_S") {
        if let Ok(n) = val.parse::<u64>() {
            config.health.interval_s = n;
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
