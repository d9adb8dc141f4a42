//! Request executor trait — one network attempt against one provider.
//!
//! The `HttpExecutor` in `http_executor.rs` is the production implementation.
//! Retry policy lives entirely in the failover controller; implementations
//! make exactly one call and report what happened.

use async_trait::async_trait;

use switchboard_core::types::{ChatRequest, UsageInfo};

use crate::error::ExecutorError;
use crate::provider::Provider;

/// A normalized successful completion, before provider/latency are attached.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCompletion {
    pub content: String,
    /// Model reported by the provider, or the one that was requested.
    pub model: String,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Performs single attempts against providers.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Send one chat completion.
    ///
    /// * `model` — concrete model id, already resolved for `provider`.
    /// * `request` — messages and streaming flag; sampling values come in
    ///   resolved as `temperature` / `max_tokens`.
    async fn execute(
        &self,
        provider: &Provider,
        model: &str,
        request: &ChatRequest,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<RawCompletion, ExecutorError>;

    /// Cheap connectivity check. `Ok` means the provider answered 200.
    async fn probe(&self, provider: &Provider) -> Result<(), ExecutorError>;
}
