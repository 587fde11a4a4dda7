//! Config loader: reads `~/.modelkit/config.json`, applies legacy
//! migrations, and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `ModelKitConfig::default()`)
//! 2. JSON file at `~/.modelkit/config.json`
//! 3. Environment variables `MODELKIT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use super::schema::ModelKitConfig;
use crate::types::ProviderId;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) + env vars.
///
/// Falls back to defaults if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> ModelKitConfig {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> ModelKitConfig {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(ModelKitConfig::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(ModelKitConfig::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(ModelKitConfig::default());
        }
    };

    migrate_config(&mut raw);

    let config: ModelKitConfig = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(ModelKitConfig::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &ModelKitConfig, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config).context("serializing config")?;

    std::fs::write(&config_path, json)
        .with_context(|| format!("writing config to {}", config_path.display()))?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Provider overrides used to spell the base URL `apiBase`; it is now `baseUrl`.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(providers) = raw.get_mut("providers").and_then(|p| p.as_object_mut()) else {
        return;
    };
    for (name, entry) in providers.iter_mut() {
        let Some(obj) = entry.as_object_mut() else {
            continue;
        };
        if obj.contains_key("baseUrl") {
            continue;
        }
        if let Some(base) = obj.remove("apiBase") {
            obj.insert("baseUrl".to_string(), base);
            debug!("Migrated providers.{name}.apiBase → providers.{name}.baseUrl");
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `MODELKIT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `MODELKIT_HTTP__TIMEOUT_SECS` → `http.timeout_secs`
/// - `MODELKIT_HTTP__CONNECT_TIMEOUT_SECS` → `http.connect_timeout_secs`
/// - `MODELKIT_HTTP__USER_AGENT` → `http.user_agent`
/// - `MODELKIT_PROBE__IMAGE_PATH` → `probe.image_path`
/// - `MODELKIT_PROBE__EXPECTED_TOKEN` → `probe.expected_token`
/// - `MODELKIT_DIAGNOSTICS__LINUX_HOST_ALIAS` → `diagnostics.linux_host_alias`
/// - `MODELKIT_DIAGNOSTICS__DEFAULT_HOST_ALIAS` → `diagnostics.default_host_alias`
/// - `MODELKIT_PROVIDERS__<NAME>__BASE_URL` → `providers.<name>.base_url`
fn apply_env_overrides(mut config: ModelKitConfig) -> ModelKitConfig {
    if let Ok(val) = std::env::var("MODELKIT_HTTP__TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.http.timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("MODELKIT_HTTP__CONNECT_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.http.connect_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("MODELKIT_HTTP__USER_AGENT") {
        config.http.user_agent = val;
    }

    if let Ok(val) = std::env::var("MODELKIT_PROBE__IMAGE_PATH") {
        config.probe.image_path = Some(val);
    }
    if let Ok(val) = std::env::var("MODELKIT_PROBE__EXPECTED_TOKEN") {
        config.probe.expected_token = val;
    }

    if let Ok(val) = std::env::var("MODELKIT_DIAGNOSTICS__LINUX_HOST_ALIAS") {
        config.diagnostics.linux_host_alias = val;
    }
    if let Ok(val) = std::env::var("MODELKIT_DIAGNOSTICS__DEFAULT_HOST_ALIAS") {
        config.diagnostics.default_host_alias = val;
    }

    for id in ProviderId::ALL {
        let name = id.as_str().to_uppercase();
        if let Ok(val) = std::env::var(format!("MODELKIT_PROVIDERS__{name}__BASE_URL")) {
            config.providers.get_or_insert(*id).base_url = Some(val);
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
