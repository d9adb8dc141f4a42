//! Router — the composition root callers talk to.
//!
//! Owns the registry, the failover controller, the pending store, the health
//! monitor and the transcriber. Built explicitly from config; there is no
//! process-wide instance.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchboard_core::config::Config;
use switchboard_core::types::{ChatRequest, ChatResponse, Message};
use switchboard_core::utils::expand_home;

use crate::error::RouterError;
use crate::failover::{FailoverController, FailoverPolicy};
use crate::health::{HealthMonitor, ProbeResult};
use crate::http_executor::HttpExecutor;
use crate::pending::{OnCompleteFn, PendingTask, PendingTaskStore, RetryOutcome};
use crate::provider::ProviderStats;
use crate::registry::ProviderRegistry;
use crate::traits::RequestExecutor;
use crate::transcription::Transcriber;

/// Optional knobs for [`Router::chat`].
#[derive(Clone, Debug, Default)]
pub struct ChatOptions {
    /// Model alias or concrete id; `"default"` when unset.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn model(alias: impl Into<String>) -> Self {
        Self {
            model: Some(alias.into()),
            ..Self::default()
        }
    }
}

pub struct Router {
    registry: Arc<ProviderRegistry>,
    pending: Arc<PendingTaskStore>,
    controller: FailoverController,
    monitor: Arc<HealthMonitor>,
    health_enabled: bool,
    transcriber: Transcriber,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("controller", &self.controller)
            .field("pending", &self.pending)
            .field("health_enabled", &self.health_enabled)
            .finish()
    }
}

impl Router {
    /// Build with the HTTP executor.
    pub fn from_config(config: &Config) -> Self {
        let http = HttpExecutor::new().with_timeouts(
            Duration::from_secs(config.router.request_timeout_s),
            Duration::from_secs(config.health.probe_timeout_s),
        );
        let transcriber = Transcriber::new(http.client().clone());
        Self::build(config, Arc::new(http), transcriber)
    }

    /// Build with a caller-supplied executor.
    pub fn with_executor(config: &Config, executor: Arc<dyn RequestExecutor>) -> Self {
        Self::build(config, executor, Transcriber::default())
    }

    fn build(config: &Config, executor: Arc<dyn RequestExecutor>, transcriber: Transcriber) -> Self {
        let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
        let pending = Arc::new(PendingTaskStore::new(
            config.router.max_pending_retries,
            config
                .router
                .pending_store_path
                .as_deref()
                .map(expand_home),
        ));
        let controller = FailoverController::new(
            registry.clone(),
            executor.clone(),
            pending.clone(),
            FailoverPolicy::from_config(&config.router),
        );
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            executor,
            Duration::from_secs(config.health.interval_s.max(1)),
        ));
        let transcriber = transcriber
            .with_defaults(
                config.transcription.model.clone(),
                config.transcription.language.clone(),
            )
            .with_timeout(Duration::from_secs(config.transcription.timeout_s));

        Self {
            registry,
            pending,
            controller,
            monitor,
            health_enabled: config.health.enabled,
            transcriber,
            monitor_handle: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    // ─────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────

    /// Read persisted pending tasks. Returns how many were loaded.
    pub async fn load_pending(&self) -> Result<usize, RouterError> {
        self.pending
            .load()
            .await
            .map_err(|e| RouterError::Persistence(format!("{e:#}")))
    }

    /// Start background health probing. No-op when disabled or running.
    pub async fn start(&self) {
        if !self.health_enabled {
            info!("health monitoring disabled");
            return;
        }
        let mut handle = self.monitor_handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("health monitor already running");
            return;
        }
        *handle = Some(self.monitor.start());
    }

    /// Stop background probing and wait for the loop to exit.
    pub async fn stop(&self) {
        let handle = self.monitor_handle.lock().await.take();
        if let Some(handle) = handle {
            self.monitor.stop();
            if let Err(e) = handle.await {
                warn!(error = %e, "health monitor task ended abnormally");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.monitor_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    // ─────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────

    pub async fn chat(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> Result<ChatResponse, RouterError> {
        let request = ChatRequest {
            messages,
            model: options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };
        self.controller.chat(request, None).await
    }

    pub async fn chat_request(&self, request: ChatRequest) -> Result<ChatResponse, RouterError> {
        self.controller.chat(request, None).await
    }

    /// Like [`Router::chat_request`]; if the request ends up queued,
    /// `on_complete` receives the response once a replay succeeds.
    pub async fn chat_with_callback(
        &self,
        request: ChatRequest,
        on_complete: OnCompleteFn,
    ) -> Result<ChatResponse, RouterError> {
        self.controller.chat(request, Some(on_complete)).await
    }

    /// Single-turn helper: optional system prompt plus one user message.
    pub async fn quick_chat(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        model_alias: Option<&str>,
    ) -> Result<String, RouterError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let options = ChatOptions {
            model: model_alias.map(String::from),
            ..ChatOptions::default()
        };
        Ok(self.chat(messages, options).await?.content)
    }

    // ─────────────────────────────────────────
    // Transcription
    // ─────────────────────────────────────────

    /// Transcribe on the highest-priority provider with a whisper model.
    /// No retry and no fallback.
    pub async fn transcribe_audio(
        &self,
        path: &Path,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Result<String, RouterError> {
        let candidates = self.registry.transcription_candidates().await;
        let Some(provider) = candidates.first() else {
            return Err(RouterError::TranscriptionUnavailable);
        };
        self.transcriber
            .transcribe(provider, path, model, language)
            .await
            .map_err(RouterError::Transcription)
    }

    // ─────────────────────────────────────────
    // Observability / admin
    // ─────────────────────────────────────────

    pub async fn provider_stats(&self) -> Vec<ProviderStats> {
        self.registry.stats().await
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.count().await
    }

    pub async fn pending_tasks(&self) -> Vec<PendingTask> {
        self.pending.list().await
    }

    pub async fn retry_pending(&self) -> Vec<RetryOutcome> {
        self.pending.retry_all(&self.controller).await
    }

    /// One probe sweep, outside the background loop.
    pub async fn check_health(&self) -> Vec<ProbeResult> {
        self.monitor.check_once().await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
