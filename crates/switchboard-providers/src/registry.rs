//! Provider registry — the ordered provider set and its live health state.
//!
//! Request handlers and the health monitor update the same records
//! concurrently, so every mutation is a single write-locked section on a
//! registry-wide `RwLock`. Readers get cloned snapshots.

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use switchboard_core::config::ProviderConfig;

use crate::provider::{HealthStatus, Provider, ProviderStats};

/// Consecutive errors after which a provider is demoted.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Where a failure was observed; decides the demotion target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureContext {
    /// A user request exhausted its attempts on this provider → `Degraded`.
    Inline,
    /// A background health probe failed → `Down`.
    Probe,
}

/// Ordered set of providers, ascending priority.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Provider>>,
}

impl ProviderRegistry {
    /// Create a registry. Sorting is stable: equal priorities keep input order.
    pub fn new(mut providers: Vec<Provider>) -> Self {
        providers.sort_by_key(|p| p.priority);
        info!(
            providers = ?providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "initialized provider registry"
        );
        Self {
            providers: RwLock::new(providers),
        }
    }

    /// Build from config, skipping providers with no key or no models.
    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        let providers = configs
            .iter()
            .filter_map(|c| {
                let provider = Provider::from_config(c);
                if provider.is_none() {
                    if c.is_configured() {
                        warn!(provider = %c.name, "provider declares no models, skipping");
                    } else {
                        debug!(provider = %c.name, "no API key, skipping");
                    }
                }
                provider
            })
            .collect();
        Self::new(providers)
    }

    /// Snapshot of providers by ascending priority; `healthy_only` drops `Down`.
    pub async fn list(&self, healthy_only: bool) -> Vec<Provider> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .filter(|p| !healthy_only || p.status != HealthStatus::Down)
            .cloned()
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<Provider> {
        let providers = self.providers.read().await;
        providers.iter().find(|p| p.name == name).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }

    /// A request succeeded: healthy again, counters reset, usage recorded.
    pub async fn record_success(&self, name: &str, latency_ms: f64) {
        self.update(name, |p| {
            p.status = HealthStatus::Healthy;
            p.error_count = 0;
            p.last_error = None;
            p.latency_ms = latency_ms;
            p.last_used = Some(Utc::now());
        })
        .await;
    }

    /// A non-final attempt failed: count it, keep the status.
    pub async fn record_attempt_failure(&self, name: &str, error: &str) {
        self.update(name, |p| {
            p.error_count += 1;
            p.last_error = Some(error.to_string());
        })
        .await;
    }

    /// Count a failure and demote once the threshold is reached.
    pub async fn record_failure(&self, name: &str, error: &str, context: FailureContext) {
        self.update(name, |p| {
            p.error_count += 1;
            p.last_error = Some(error.to_string());
            if p.error_count >= FAILURE_THRESHOLD {
                let demoted = match context {
                    FailureContext::Inline => HealthStatus::Degraded,
                    FailureContext::Probe => HealthStatus::Down,
                };
                // An inline failure never lifts a Down provider back to Degraded.
                if p.status != HealthStatus::Down && p.status != demoted {
                    warn!(
                        provider = %p.name,
                        errors = p.error_count,
                        status = %demoted,
                        "provider demoted"
                    );
                    p.status = demoted;
                }
            }
        })
        .await;
    }

    /// A probe succeeded. Unlike `record_success`, `last_used` is untouched.
    pub async fn record_probe_success(&self, name: &str, latency_ms: f64) {
        self.update(name, |p| {
            if p.status == HealthStatus::Down {
                info!(provider = %p.name, "provider is back online");
            }
            p.status = HealthStatus::Healthy;
            p.error_count = 0;
            p.last_error = None;
            p.latency_ms = latency_ms;
        })
        .await;
    }

    /// Reset every provider to healthy. Used when nothing is left to try.
    pub async fn force_recover_all(&self) {
        let mut providers = self.providers.write().await;
        warn!(count = providers.len(), "no healthy providers, forcing recovery");
        for p in providers.iter_mut() {
            p.status = HealthStatus::Healthy;
            p.error_count = 0;
        }
    }

    /// Stats for every provider, priority order.
    pub async fn stats(&self) -> Vec<ProviderStats> {
        let providers = self.providers.read().await;
        providers.iter().map(Provider::stats).collect()
    }

    /// Providers that declare a transcription model, priority order.
    pub async fn transcription_candidates(&self) -> Vec<Provider> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .filter(|p| p.transcription_model().is_some())
            .cloned()
            .collect()
    }

    async fn update(&self, name: &str, f: impl FnOnce(&mut Provider)) {
        let mut providers = self.providers.write().await;
        match providers.iter_mut().find(|p| p.name == name) {
            Some(p) => f(p),
            None => warn!(provider = name, "update for unknown provider ignored"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
