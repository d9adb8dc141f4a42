//! Provider routing layer for Switchboard.
//!
//! Dispatches chat completions across a prioritized, health-tracked set of
//! OpenAI-compatible providers, with per-provider retries, cross-provider
//! failover, background health probing, and a replay queue for requests
//! that fail everywhere.
//!
//! # Architecture
//!
//! - [`registry::ProviderRegistry`] — ordered providers + live health state
//! - [`models::ModelMapper`] — logical alias → provider-specific model id
//! - [`traits::RequestExecutor`] — one network attempt; [`http_executor::HttpExecutor`] is the reqwest implementation
//! - [`failover::FailoverController`] — provider × attempt matrix for one request
//! - [`health::HealthMonitor`] — periodic `GET /models` probes
//! - [`pending::PendingTaskStore`] — queue of exhausted requests, optionally persisted
//! - [`router::Router`] — composition root exposing the public surface

pub mod error;
pub mod failover;
pub mod health;
pub mod http_executor;
pub mod models;
pub mod pending;
pub mod provider;
pub mod registry;
pub mod router;
pub mod traits;
pub mod transcription;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use error::{ExecutorError, RouterError};
pub use failover::{FailoverController, FailoverPolicy};
pub use health::{HealthMonitor, ProbeResult};
pub use http_executor::HttpExecutor;
pub use models::ModelMapper;
pub use pending::{on_complete, OnCompleteFn, PendingTask, PendingTaskStore, RetryOutcome};
pub use provider::{HealthStatus, Provider, ProviderStats, WireFlavour};
pub use registry::{FailureContext, ProviderRegistry};
pub use router::{ChatOptions, Router};
pub use traits::{RawCompletion, RequestExecutor};
pub use transcription::Transcriber;
