//! Error taxonomy for the routing layer.
//!
//! `ExecutorError` describes one failed attempt and never reaches callers
//! directly; `RouterError` is what `Router` methods return.

use thiserror::Error;

/// Failure of a single network attempt (chat, probe, or transcription).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    /// Connection refused, DNS failure, timeout, …
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Provider answered with an embedded `error` object.
    #[error("API error: {0}")]
    Api(String),

    /// Local file problem (transcription uploads).
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for ExecutorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExecutorError::Malformed(e.to_string())
        } else {
            ExecutorError::Network(e.to_string())
        }
    }
}

/// Errors surfaced to callers of the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The registry holds no providers at all.
    #[error("no providers configured")]
    NoProviders,

    /// Every attempt on every provider failed. Internal to dispatch; callers
    /// of `chat` see `Exhausted` instead.
    #[error("all providers failed, last error: {last_error}")]
    AllFailed { last_error: String },

    /// Every attempt failed and the request was queued for replay.
    #[error("all providers exhausted, request queued as {task_id}: {last_error}")]
    Exhausted { task_id: String, last_error: String },

    /// No provider declares a transcription model.
    #[error("no provider available for audio transcription")]
    TranscriptionUnavailable,

    /// The transcription call itself failed.
    #[error("transcription failed: {0}")]
    Transcription(#[source] ExecutorError),

    /// Pending store could not be read or written.
    #[error("pending store error: {0}")]
    Persistence(String),
}

impl RouterError {
    /// The pending-task id, if this error queued the request.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            RouterError::Exhausted { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Text that is safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            RouterError::Exhausted { task_id, .. } => format!(
                "Service temporarily unavailable, your request has been queued as {task_id}"
            ),
            RouterError::TranscriptionUnavailable | RouterError::Transcription(_) => {
                "Voice transcription is currently unavailable".to_string()
            }
            _ => "Service temporarily unavailable".to_string(),
        }
    }
}
