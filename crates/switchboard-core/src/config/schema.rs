//! Configuration schema.
//!
//! Hierarchy: `Config` → `Vec<ProviderConfig>`, `RouterConfig`,
//! `HealthConfig`, `TranscriptionConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.switchboard/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Upstream providers, in any order; the registry sorts by priority.
    pub providers: Vec<ProviderConfig>,
    pub router: RouterConfig,
    pub health: HealthConfig,
    pub transcription: TranscriptionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            router: RouterConfig::default(),
            health: HealthConfig::default(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl Config {
    /// Find a provider entry by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Mutable lookup by name.
    pub fn provider_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        self.providers.iter_mut().find(|p| p.name == name)
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single upstream provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Unique provider name (e.g. `"groq"`). Also selects built-in model aliases.
    pub name: String,
    /// API key for Bearer authentication. Empty = provider disabled.
    pub api_key: String,
    /// API base URL, without the `/chat/completions` suffix.
    pub api_base: String,
    /// Model identifiers this provider serves. The first is the fallback model.
    pub models: Vec<String>,
    /// Lower is tried first.
    pub priority: u32,
    /// Wire flavour: `"openai"` or `"anthropic"`. Defaults from the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavour: Option<String>,
    /// Alias → model id overrides layered above the built-in table.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub aliases: HashMap<String, String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    /// Create a provider entry with no key.
    pub fn new(name: &str, api_base: &str, models: &[&str], priority: u32) -> Self {
        Self {
            name: name.to_string(),
            api_base: api_base.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            priority,
            ..Default::default()
        }
    }

    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// The four providers the bot ships with, keys left empty.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(
            "groq",
            "https://api.groq.com/openai/v1",
            &[
                "llama-3.1-8b-instant",
                "mixtral-8x7b-32768",
                "gemma-7b-it",
                "whisper-large-v3",
            ],
            1,
        ),
        ProviderConfig::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            &[
                "mistralai/mistral-7b-instruct",
                "anthropic/claude-3-sonnet",
                "openai/gpt-3.5-turbo",
            ],
            2,
        ),
        ProviderConfig::new(
            "anthropic",
            "https://api.anthropic.com/v1",
            &["claude-3-sonnet-20240229", "claude-3-haiku-20240307"],
            3,
        ),
        ProviderConfig::new(
            "openai",
            "https://api.openai.com/v1",
            &["gpt-3.5-turbo", "gpt-4"],
            4,
        ),
    ]
}

// ─────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────

/// Failover and pending-queue policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterConfig {
    /// Attempts per provider before falling over to the next one.
    pub max_attempts_per_provider: u32,
    /// Base delay for linear backoff (`delay × attempt`), in milliseconds.
    pub retry_delay_ms: u64,
    /// Timeout for a single chat completion call, in seconds.
    pub request_timeout_s: u64,
    /// Replay attempts before a pending task is dropped.
    pub max_pending_retries: u32,
    /// Where pending tasks are persisted. `null` keeps them in memory only.
    pub pending_store_path: Option<String>,
    /// How often `serve` replays pending tasks, in seconds.
    pub pending_sweep_interval_s: u64,
    /// Sampling temperature when the caller gives none.
    pub temperature: f64,
    /// Token budget when the caller gives none.
    pub max_tokens: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: 3,
            retry_delay_ms: 2000,
            request_timeout_s: 60,
            max_pending_retries: 3,
            pending_store_path: Some("~/.switchboard/pending.json".to_string()),
            pending_sweep_interval_s: 300,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

// ─────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────

/// Background health probing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Seconds between probe sweeps.
    pub interval_s: u64,
    /// Timeout for one `GET /models` probe, in seconds.
    pub probe_timeout_s: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: 60,
            probe_timeout_s: 10,
        }
    }
}

// ─────────────────────────────────────────────
// Transcription
// ─────────────────────────────────────────────

/// Voice transcription defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionConfig {
    /// Whisper model name.
    pub model: String,
    /// Spoken language hint (ISO 639-1). `None` = auto-detect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Timeout for one upload, in seconds.
    pub timeout_s: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-large-v3".into(),
            language: None,
            timeout_s: 60,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.router.max_attempts_per_provider, 3);
        assert_eq!(config.router.retry_delay_ms, 2000);
        assert_eq!(config.router.max_pending_retries, 3);
        assert_eq!(config.health.interval_s, 60);
        assert_eq!(config.health.probe_timeout_s, 10);
        assert_eq!(config.transcription.model, "whisper-large-v3");
    }

    #[test]
    fn test_default_providers_unconfigured() {
        let config = Config::default();
        assert!(config.providers.iter().all(|p| !p.is_configured()));
        assert!(config.providers.iter().all(|p| !p.models.is_empty()));
        assert_eq!(config.provider("groq").unwrap().priority, 1);
        assert_eq!(config.provider("openai").unwrap().priority, 4);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = serde_json::json!({
            "providers": [{
                "name": "local",
                "apiKey": "k",
                "apiBase": "http://localhost:8000/v1",
                "models": ["qwen2.5"],
                "priority": 5,
                "aliases": {"planner": "qwen2.5-72b"}
            }],
            "router": {
                "maxAttemptsPerProvider": 2,
                "retryDelayMs": 10
            }
        });

        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.providers.len(), 1);
        let local = config.provider("local").unwrap();
        assert!(local.is_configured());
        assert_eq!(local.aliases.get("planner").map(String::as_str), Some("qwen2.5-72b"));
        assert_eq!(config.router.max_attempts_per_provider, 2);
        assert_eq!(config.router.retry_delay_ms, 10);
        // Defaults preserved for missing fields
        assert_eq!(config.router.max_tokens, 2048);
        assert!(config.health.enabled);
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["router"].get("maxAttemptsPerProvider").is_some());
        assert!(json["health"].get("probeTimeoutS").is_some());
        assert!(json["providers"][0].get("apiKey").is_some());
        assert!(json["router"].get("max_attempts_per_provider").is_none());
    }

    #[test]
    fn test_pending_store_can_be_disabled() {
        let json = serde_json::json!({"router": {"pendingStorePath": null}});
        let config: Config = serde_json::from_value(json).unwrap();
        assert!(config.router.pending_store_path.is_none());
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.router.temperature, 0.7);
    }
}
