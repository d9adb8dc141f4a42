//! Core types for Switchboard — chat messages, requests, and responses.
//!
//! These types model the OpenAI chat completions API format spoken by every
//! upstream provider. `ChatRequest` and `ChatResponse` are the caller-facing
//! shapes; `ChatCompletionRequest` / `ChatCompletionResponse` are the wire
//! shapes.

use serde::{Deserialize, Serialize};

/// Alias used when the caller does not name a model.
pub const DEFAULT_MODEL_ALIAS: &str = "default";

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message: role plus plain-text content.
///
/// Serializes to `{"role": "...", "content": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ─────────────────────────────────────────────
// ChatRequest (caller-facing)
// ─────────────────────────────────────────────

/// One logical chat-completion request.
///
/// `model` is a logical alias (`"default"`, `"coder"`, `"planner"`) or a
/// concrete model id; it is resolved per provider at dispatch time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Kept for callers that set it; responses are always delivered whole.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Create a request with default model, sampling, and budget.
    pub fn new(messages: Vec<Message>) -> Self {
        ChatRequest {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    pub fn with_model(mut self, alias: impl Into<String>) -> Self {
        self.model = Some(alias.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// The model alias to resolve, `"default"` when unset.
    pub fn model_alias(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL_ALIAS)
    }

    /// Content of the first message, or `""` for an empty request.
    pub fn first_content(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────
// ChatResponse (caller-facing)
// ─────────────────────────────────────────────

/// Token usage statistics reported by a provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Normalized result of a successful chat request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Assistant text.
    pub content: String,
    /// Name of the provider that answered.
    pub provider: String,
    /// Concrete model id reported by (or sent to) the provider.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Round-trip latency of the successful attempt, in milliseconds.
    pub latency_ms: f64,
}

// ─────────────────────────────────────────────
// Wire types (OpenAI-compatible chat completions)
// ─────────────────────────────────────────────

/// Request body for `POST {base}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Raw chat completion response.
///
/// `error` is checked before `choices`: some providers answer 200 with an
/// embedded error object.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
