//! HTTP request executor for OpenAI-compatible chat completion APIs.
//!
//! One POST to `{base}/chat/completions` per attempt, one GET to
//! `{base}/models` per probe. The wire flavour of the provider decides how
//! messages are laid out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use switchboard_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatRequest, Message, Role,
};

use crate::error::ExecutorError;
use crate::provider::{Provider, WireFlavour};
use crate::traits::{RawCompletion, RequestExecutor};

/// Default timeout for one chat completion.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Default timeout for one health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────
// HttpExecutor
// ─────────────────────────────────────────────

/// Talks to any OpenAI-compatible HTTP API through a shared,
/// connection-pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, request: Duration, probe: Duration) -> Self {
        self.request_timeout = request;
        self.probe_timeout = probe;
        self
    }

    /// The shared client, reused by the transcriber.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(
        &self,
        provider: &Provider,
        model: &str,
        request: &ChatRequest,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<RawCompletion, ExecutorError> {
        let body = ChatCompletionRequest {
            model: model.to_string(),
            messages: format_messages(provider.flavour, &request.messages),
            temperature,
            max_tokens,
            // Replies are parsed as one JSON body, so upstream streaming stays off.
            stream: false,
        };

        debug!(
            provider = %provider.name,
            model = %model,
            messages = body.messages.len(),
            "calling chat completions"
        );

        let response = self
            .client
            .post(provider.endpoint("chat/completions"))
            .bearer_auth(&provider.api_key)
            .headers(extra_headers(provider))
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        parse_completion(&text, model)
    }

    async fn probe(&self, provider: &Provider) -> Result<(), ExecutorError> {
        let response = self
            .client
            .get(provider.endpoint("models"))
            .bearer_auth(&provider.api_key)
            .headers(extra_headers(provider))
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

// ─────────────────────────────────────────────
// Wire helpers
// ─────────────────────────────────────────────

/// Lay out messages for the provider's wire flavour.
///
/// Anthropic-flavoured endpoints have no `system` role: each system message
/// becomes a user message prefixed with `"System: "`.
pub fn format_messages(flavour: WireFlavour, messages: &[Message]) -> Vec<Message> {
    match flavour {
        WireFlavour::OpenAi => messages.to_vec(),
        WireFlavour::Anthropic => messages
            .iter()
            .map(|m| match m.role {
                Role::System => Message::user(format!("System: {}", m.content)),
                _ => m.clone(),
            })
            .collect(),
    }
}

/// Normalize a 2xx body. `error` is checked before `choices`.
fn parse_completion(body: &str, requested_model: &str) -> Result<RawCompletion, ExecutorError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ExecutorError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.error {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return Err(ExecutorError::Api(message));
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ExecutorError::Malformed("response has no choices".to_string()))?;

    Ok(RawCompletion {
        content: choice.message.content.unwrap_or_default(),
        model: parsed
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

fn extra_headers(provider: &Provider) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in &provider.extra_headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(val)) => {
                headers.insert(name, val);
            }
            _ => warn!(provider = %provider.name, header = %key, "invalid header, skipping"),
        }
    }
    headers
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
