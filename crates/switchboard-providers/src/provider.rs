//! Provider record — one configured upstream plus its live health state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchboard_core::config::ProviderConfig;

// ─────────────────────────────────────────────
// Health status
// ─────────────────────────────────────────────

/// Operational classification of a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Failing inline requests, still tried.
    Degraded,
    /// Failing probes, skipped until it recovers or everything is down.
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// Wire flavour
// ─────────────────────────────────────────────

/// How messages are laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFlavour {
    /// Plain OpenAI chat completions.
    OpenAi,
    /// No `system` role: system messages are folded into user messages.
    Anthropic,
}

impl WireFlavour {
    /// Explicit config value wins; otherwise the provider named `anthropic`
    /// gets the Anthropic layout.
    pub fn resolve(name: &str, configured: Option<&str>) -> Self {
        match configured.map(|s| s.to_lowercase()) {
            Some(f) if f == "anthropic" => WireFlavour::Anthropic,
            Some(_) => WireFlavour::OpenAi,
            None if name == "anthropic" => WireFlavour::Anthropic,
            None => WireFlavour::OpenAi,
        }
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// A named remote inference endpoint.
///
/// Owned by [`crate::registry::ProviderRegistry`]; everything else works on
/// cloned snapshots.
#[derive(Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    /// Declared models, never empty.
    pub models: Vec<String>,
    pub priority: u32,
    pub flavour: WireFlavour,
    /// Alias → model id overrides from config.
    pub aliases: HashMap<String, String>,
    pub extra_headers: HashMap<String, String>,

    pub status: HealthStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
    pub latency_ms: f64,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("error_count", &self.error_count)
            .finish()
    }
}

impl Provider {
    /// Create a healthy provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
        priority: u32,
    ) -> Self {
        let name = name.into();
        Provider {
            flavour: WireFlavour::resolve(&name, None),
            name,
            base_url: base_url.into(),
            api_key: api_key.into(),
            models,
            priority,
            aliases: HashMap::new(),
            extra_headers: HashMap::new(),
            status: HealthStatus::Healthy,
            error_count: 0,
            last_error: None,
            last_used: None,
            latency_ms: 0.0,
        }
    }

    /// Build from config. `None` for entries with no key or no models.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        if !config.is_configured() || config.models.is_empty() {
            return None;
        }
        let mut provider = Provider::new(
            config.name.clone(),
            config.api_base.clone(),
            config.api_key.clone(),
            config.models.clone(),
            config.priority,
        );
        provider.flavour = WireFlavour::resolve(&config.name, config.flavour.as_deref());
        provider.aliases = config.aliases.clone();
        provider.extra_headers = config.extra_headers.clone().unwrap_or_default();
        Some(provider)
    }

    /// `base_url` joined with `path`, tolerating a trailing slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// First declared model containing `whisper`, if any.
    pub fn transcription_model(&self) -> Option<&str> {
        self.models
            .iter()
            .map(String::as_str)
            .find(|m| m.to_lowercase().contains("whisper"))
    }

    /// Observability snapshot.
    pub fn stats(&self) -> ProviderStats {
        ProviderStats {
            name: self.name.clone(),
            status: self.status,
            priority: self.priority,
            models: self.models.len(),
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            last_used: self.last_used.map(|t| t.to_rfc3339()),
            latency_ms: self.latency_ms,
        }
    }
}

/// Snapshot of a provider for status displays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub name: String,
    pub status: HealthStatus,
    pub priority: u32,
    pub models: usize,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_used: Option<String>,
    pub latency_ms: f64,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
