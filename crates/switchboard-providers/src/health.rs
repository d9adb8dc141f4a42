//! Health monitor — periodic connectivity probes for every provider.
//!
//! Runs independently of request traffic. A probe success marks the provider
//! healthy; three failures in a row mark it down. Probe errors never leave
//! this module, they only show up as registry state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{FailureContext, ProviderRegistry};
use crate::traits::RequestExecutor;

/// Default interval between sweeps.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Result of probing one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

// ─────────────────────────────────────────────
// HealthMonitor
// ─────────────────────────────────────────────

pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    executor: Arc<dyn RequestExecutor>,
    interval: Duration,
    /// Token of the current run; replaced by every `start()`.
    shutdown: Mutex<CancellationToken>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.interval)
            .finish()
    }
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        executor: Arc<dyn RequestExecutor>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            interval,
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.shutdown.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the probe loop. A loop left over from an earlier `start()` is
    /// cancelled first.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let token = CancellationToken::new();
        {
            let mut current = self.token();
            current.cancel();
            *current = token.clone();
        }
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run(token).await })
    }

    /// Cancel the running loop. Idempotent.
    pub fn stop(&self) {
        info!("stopping health monitor");
        self.token().cancel();
    }

    /// Probe loop: sleep one interval, sweep, repeat until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_s = self.interval.as_secs(), "health monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.check_once().await;
                }
                _ = shutdown.cancelled() => {
                    info!("health monitor shutting down");
                    return;
                }
            }
        }
    }

    /// Probe every provider once, in priority order.
    pub async fn check_once(&self) -> Vec<ProbeResult> {
        let providers = self.registry.list(false).await;
        let mut results = Vec::with_capacity(providers.len());

        for provider in &providers {
            let started = Instant::now();
            let outcome = self.executor.probe(provider).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(()) => {
                    self.registry
                        .record_probe_success(&provider.name, latency_ms)
                        .await;
                    debug!(provider = %provider.name, latency_ms, "probe ok");
                    results.push(ProbeResult {
                        provider: provider.name.clone(),
                        healthy: true,
                        latency_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    self.registry
                        .record_failure(&provider.name, &error, FailureContext::Probe)
                        .await;
                    warn!(provider = %provider.name, error = %error, "probe failed");
                    results.push(ProbeResult {
                        provider: provider.name.clone(),
                        healthy: false,
                        latency_ms,
                        error: Some(error),
                    });
                }
            }
        }

        results
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
