//! Configuration schema.
//!
//! Hierarchy: `ModelKitConfig` → `HttpConfig`, `ProvidersConfig`,
//! `ProbeConfig`, `DiagnosticsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ProviderId;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.modelkit/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelKitConfig {
    pub http: HttpConfig,
    pub providers: ProvidersConfig,
    pub probe: ProbeConfig,
    pub diagnostics: DiagnosticsConfig,
}

// ─────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────

/// Settings for the shared `reqwest` client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Idle keep-alive connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Seconds an idle pooled connection is kept.
    pub pool_idle_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 100,
            pool_idle_timeout_secs: 30,
            user_agent: format!("modelkit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Overrides for one provider's static defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOverride {
    /// Replaces the built-in default base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Replaces the built-in default embedding batch ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_batch_limit: Option<usize>,
    /// `true` removes the provider from the registry.
    pub disabled: bool,
}

/// Provider overrides keyed by provider name (`"openai"`, `"ollama"`, ...).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    #[serde(flatten)]
    pub overrides: HashMap<String, ProviderOverride>,
}

impl ProvidersConfig {
    /// Override for `id`, matching keys case-insensitively and by alias.
    pub fn get(&self, id: ProviderId) -> Option<&ProviderOverride> {
        self.overrides
            .iter()
            .find(|(name, _)| ProviderId::parse(name) == id)
            .map(|(_, o)| o)
    }

    pub fn get_or_insert(&mut self, id: ProviderId) -> &mut ProviderOverride {
        self.overrides.entry(id.as_str().to_string()).or_default()
    }
}

// ─────────────────────────────────────────────
// Probe
// ─────────────────────────────────────────────

/// Image asset for the multimodal capability probe.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeConfig {
    /// Path to the probe picture (`~` expanded). Image checks need this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Overrides the MIME type guessed from the extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Subject of the picture that a vision model should name.
    pub expected_token: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            image_path: None,
            mime_type: None,
            expected_token: "dog".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────

/// Host-machine aliases suggested when a local URL is unreachable from a
/// container.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    pub linux_host_alias: String,
    pub default_host_alias: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            linux_host_alias: "172.17.0.1".to_string(),
            default_host_alias: "host.docker.internal".to_string(),
        }
    }
}
