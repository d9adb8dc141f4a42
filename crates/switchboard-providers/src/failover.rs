//! Failover controller — the provider × attempt matrix for one request.
//!
//! Providers are walked in priority order. Each gets up to
//! `max_attempts_per_provider` tries with linear backoff between them; the
//! first success wins. When everything fails the request is queued in the
//! [`PendingTaskStore`] and the caller gets the task id back.
//!
//! ```text
//! list(healthy) ──empty──▶ force_recover_all ──▶ list(all)
//!      │
//!      ▼
//! for provider:  for attempt in 1..=N:
//!                    execute ──ok──▶ record_success ──▶ return
//!                      │ err
//!                      ├─ attempt < N → record_attempt_failure, sleep(delay × attempt)
//!                      └─ attempt = N → record_failure(Inline), next provider
//! all failed ──▶ enqueue ──▶ Exhausted { task_id }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use switchboard_core::config::RouterConfig;
use switchboard_core::types::{ChatRequest, ChatResponse};

use crate::error::RouterError;
use crate::models::ModelMapper;
use crate::pending::{OnCompleteFn, PendingTaskStore};
use crate::registry::{FailureContext, ProviderRegistry};
use crate::traits::RequestExecutor;

// ─────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────

/// Retry budget and request defaults.
#[derive(Clone, Debug)]
pub struct FailoverPolicy {
    pub max_attempts_per_provider: u32,
    /// Base of the linear backoff: attempt `n` waits `retry_delay × n`.
    pub retry_delay: Duration,
    /// Used when the request carries no temperature.
    pub temperature: f64,
    /// Used when the request carries no token budget.
    pub max_tokens: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: 3,
            retry_delay: Duration::from_secs(2),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

impl FailoverPolicy {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            max_attempts_per_provider: config.max_attempts_per_provider.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

// ─────────────────────────────────────────────
// FailoverController
// ─────────────────────────────────────────────

pub struct FailoverController {
    registry: Arc<ProviderRegistry>,
    executor: Arc<dyn RequestExecutor>,
    pending: Arc<PendingTaskStore>,
    mapper: ModelMapper,
    policy: FailoverPolicy,
}

impl std::fmt::Debug for FailoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverController")
            .field("policy", &self.policy)
            .finish()
    }
}

impl FailoverController {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        executor: Arc<dyn RequestExecutor>,
        pending: Arc<PendingTaskStore>,
        policy: FailoverPolicy,
    ) -> Self {
        Self {
            registry,
            executor,
            pending,
            mapper: ModelMapper::new(),
            policy,
        }
    }

    /// Deliver `request`, queueing it for replay if every provider fails.
    pub async fn chat(
        &self,
        request: ChatRequest,
        on_complete: Option<OnCompleteFn>,
    ) -> Result<ChatResponse, RouterError> {
        match self.dispatch(&request).await {
            Err(RouterError::AllFailed { last_error }) => {
                let task_id = self
                    .pending
                    .enqueue_with(request, Some(last_error.clone()), on_complete)
                    .await;
                error!(task_id = %task_id, error = %last_error, "all providers exhausted");
                Err(RouterError::Exhausted {
                    task_id,
                    last_error,
                })
            }
            other => other,
        }
    }

    /// Walk the provider × attempt matrix once. Never enqueues.
    pub async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResponse, RouterError> {
        let mut providers = self.registry.list(true).await;
        if providers.is_empty() {
            if self.registry.is_empty().await {
                return Err(RouterError::NoProviders);
            }
            self.registry.force_recover_all().await;
            providers = self.registry.list(false).await;
        }

        let alias = request.model_alias();
        let temperature = request.temperature.unwrap_or(self.policy.temperature);
        let max_tokens = request.max_tokens.unwrap_or(self.policy.max_tokens);
        let max_attempts = self.policy.max_attempts_per_provider.max(1);
        let mut last_error = String::new();

        for provider in &providers {
            for attempt in 1..=max_attempts {
                let model = self.mapper.resolve(alias, provider);
                let started = Instant::now();

                match self
                    .executor
                    .execute(provider, &model, request, temperature, max_tokens)
                    .await
                {
                    Ok(raw) => {
                        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                        self.registry.record_success(&provider.name, latency_ms).await;
                        info!(
                            provider = %provider.name,
                            model = %raw.model,
                            attempt,
                            latency_ms,
                            "chat completed"
                        );
                        return Ok(ChatResponse {
                            content: raw.content,
                            provider: provider.name.clone(),
                            model: raw.model,
                            usage: raw.usage,
                            finish_reason: raw.finish_reason,
                            latency_ms,
                        });
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        warn!(
                            provider = %provider.name,
                            attempt,
                            max_attempts,
                            error = %e,
                            "attempt failed"
                        );
                        if attempt < max_attempts {
                            self.registry
                                .record_attempt_failure(&provider.name, &last_error)
                                .await;
                            tokio::time::sleep(self.policy.retry_delay * attempt).await;
                        } else {
                            self.registry
                                .record_failure(&provider.name, &last_error, FailureContext::Inline)
                                .await;
                        }
                    }
                }
            }
            info!(provider = %provider.name, "provider exhausted, failing over");
        }

        Err(RouterError::AllFailed { last_error })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_executor::HttpExecutor;
    use crate::provider::{HealthStatus, Provider};
    use crate::testing::{Behaviour, ScriptedExecutor};
    use switchboard_core::types::Message;

    fn provider(name: &str, priority: u32) -> Provider {
        Provider::new(name, "http://localhost", "k", vec![format!("{name}-model")], priority)
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![Message::user("hi")])
    }

    struct Harness {
        executor: Arc<ScriptedExecutor>,
        registry: Arc<ProviderRegistry>,
        pending: Arc<PendingTaskStore>,
        controller: FailoverController,
    }

    fn harness(providers: Vec<Provider>) -> Harness {
        let executor = Arc::new(ScriptedExecutor::new());
        let registry = Arc::new(ProviderRegistry::new(providers));
        let pending = Arc::new(PendingTaskStore::in_memory());
        let controller = FailoverController::new(
            registry.clone(),
            executor.clone(),
            pending.clone(),
            FailoverPolicy::default(),
        );
        Harness {
            executor,
            registry,
            pending,
            controller,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_wins() {
        let h = harness(vec![provider("a", 1), provider("b", 2)]);
        h.executor.on_chat("a", Behaviour::Succeed);
        h.executor.on_chat("b", Behaviour::Succeed);

        let response = h.controller.chat(request(), None).await.unwrap();
        assert_eq!(response.provider, "a");
        assert_eq!(response.content, "ok from a");
        assert_eq!(h.executor.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_fallback_counts_every_attempt() {
        let h = harness(vec![provider("b", 2), provider("a", 1)]);
        h.executor.on_chat("a", Behaviour::Fail);
        h.executor.on_chat("b", Behaviour::Succeed);

        let response = h.controller.chat(request(), None).await.unwrap();
        assert_eq!(response.provider, "b");

        let a = h.registry.get("a").await.unwrap();
        assert_eq!(a.error_count, 3);
        assert_eq!(a.status, HealthStatus::Degraded);
        assert_eq!(h.executor.calls_to("a"), 3);
        assert_eq!(h.executor.calls_to("b"), 1);

        let b = h.registry.get("b").await.unwrap();
        assert_eq!(b.error_count, 0);
        assert!(b.last_used.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_same_provider() {
        let h = harness(vec![provider("a", 1), provider("b", 2)]);
        h.executor.on_chat("a", Behaviour::script(&[false, false, true]));

        let response = h.controller.chat(request(), None).await.unwrap();
        assert_eq!(response.provider, "a");
        assert_eq!(h.executor.calls_to("b"), 0);

        let a = h.registry.get("a").await.unwrap();
        assert_eq!(a.status, HealthStatus::Healthy);
        assert_eq!(a.error_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff() {
        let h = harness(vec![provider("a", 1)]);
        h.executor.on_chat("a", Behaviour::script(&[false, false, true]));

        let started = tokio::time::Instant::now();
        h.controller.chat(request(), None).await.unwrap();
        // 2s after attempt 1, 4s after attempt 2
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_providers_skipped() {
        let h = harness(vec![provider("a", 1), provider("b", 2)]);
        for _ in 0..3 {
            h.registry
                .record_failure("a", "probe", FailureContext::Probe)
                .await;
        }
        h.executor.on_chat("a", Behaviour::Succeed);
        h.executor.on_chat("b", Behaviour::Succeed);

        let response = h.controller.chat(request(), None).await.unwrap();
        assert_eq!(response.provider, "b");
        assert_eq!(h.executor.calls_to("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_recovery_when_all_down() {
        let h = harness(vec![provider("a", 1), provider("b", 2)]);
        for name in ["a", "b"] {
            for _ in 0..3 {
                h.registry
                    .record_failure(name, "probe", FailureContext::Probe)
                    .await;
            }
        }
        h.executor.on_chat("b", Behaviour::Succeed);

        let response = h.controller.chat(request(), None).await.unwrap();
        assert_eq!(response.provider, "b");
        assert_eq!(h.executor.calls_to("a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_enqueues_one_task() {
        let h = harness(vec![provider("a", 1), provider("b", 2)]);

        let err = h.controller.chat(request(), None).await.unwrap_err();
        let task_id = err.task_id().unwrap().to_string();
        assert!(matches!(err, RouterError::Exhausted { ref last_error, .. } if last_error.contains("b is down")));

        assert_eq!(h.pending.count().await, 1);
        let task = h.pending.get(&task_id).await.unwrap();
        assert_eq!(task.attempts, 1);
        assert_eq!(task.request.first_content(), "hi");
        assert_eq!(h.executor.calls().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_does_not_enqueue() {
        let h = harness(vec![provider("a", 1)]);
        let err = h.controller.dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, RouterError::AllFailed { .. }));
        assert_eq!(h.pending.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_then_replayed() {
        let h = harness(vec![provider("a", 1)]);
        h.executor.on_chat("a", Behaviour::Fail);
        let err = h.controller.chat(request(), None).await.unwrap_err();
        let task_id = err.task_id().unwrap().to_string();

        h.executor.on_chat("a", Behaviour::Succeed);
        let outcomes = h.pending.retry_all(&h.controller).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[0].task_id(), task_id);
        assert_eq!(h.pending.count().await, 0);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let h = harness(vec![]);
        let err = h.controller.chat(request(), None).await.unwrap_err();
        assert!(matches!(err, RouterError::NoProviders));
        assert_eq!(h.pending.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alias_resolved_per_provider() {
        let mut groq = provider("groq", 1);
        groq.models = vec!["llama-3.1-8b-instant".into()];
        let mut openai = provider("openai", 2);
        openai.models = vec!["gpt-3.5-turbo".into()];
        let h = harness(vec![groq, openai]);
        h.executor.on_chat("openai", Behaviour::Succeed);

        let response = h
            .controller
            .chat(request().with_model("planner"), None)
            .await
            .unwrap();
        assert_eq!(response.model, "gpt-4");
        let calls = h.executor.calls();
        assert_eq!(calls[0], ("groq".to_string(), "mixtral-8x7b-32768".to_string()));
        assert_eq!(calls.last().unwrap().1, "gpt-4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_if_any_attempt_would() {
        for (a_script, b_script, expected) in [
            (vec![true], vec![], "a"),
            (vec![false, true], vec![], "a"),
            (vec![false, false, true], vec![], "a"),
            (vec![false, false, false], vec![true], "b"),
            (vec![false, false, false], vec![false, false, true], "b"),
        ] {
            let h = harness(vec![provider("a", 1), provider("b", 2)]);
            h.executor.on_chat("a", Behaviour::script(&a_script));
            h.executor.on_chat("b", Behaviour::script(&b_script));
            let response = h.controller.chat(request(), None).await.unwrap();
            assert_eq!(response.provider, expected);
        }
    }

    #[tokio::test]
    async fn test_http_500_falls_over_to_second_provider() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .expect(3)
            .mount(&failing)
            .await;

        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}],
                "model": "m1"
            })))
            .expect(1)
            .mount(&healthy)
            .await;

        let registry = Arc::new(ProviderRegistry::new(vec![
            Provider::new("provider1", failing.uri(), "k1", vec!["m1".into()], 1),
            Provider::new("provider2", healthy.uri(), "k2", vec!["m1".into()], 2),
        ]));
        let controller = FailoverController::new(
            registry.clone(),
            Arc::new(HttpExecutor::new()),
            Arc::new(PendingTaskStore::in_memory()),
            FailoverPolicy {
                retry_delay: Duration::from_millis(1),
                ..FailoverPolicy::default()
            },
        );

        let response = controller.chat(request(), None).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.provider, "provider2");
        assert_eq!(response.model, "m1");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));

        let p1 = registry.get("provider1").await.unwrap();
        assert_eq!(p1.error_count, 3);
        assert!(p1.last_error.unwrap().contains("500"));
    }
}
