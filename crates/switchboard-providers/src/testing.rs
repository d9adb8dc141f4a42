//! In-process executor with per-provider scripted outcomes, for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use switchboard_core::types::ChatRequest;

use crate::error::ExecutorError;
use crate::provider::Provider;
use crate::traits::{RawCompletion, RequestExecutor};

/// What a provider does when called.
#[derive(Clone, Debug)]
pub(crate) enum Behaviour {
    Succeed,
    Fail,
    /// Pop one outcome per call (`true` = success); fails once drained.
    Script(VecDeque<bool>),
}

impl Behaviour {
    pub(crate) fn script(outcomes: &[bool]) -> Self {
        Behaviour::Script(outcomes.iter().copied().collect())
    }

    fn next(&mut self) -> bool {
        match self {
            Behaviour::Succeed => true,
            Behaviour::Fail => false,
            Behaviour::Script(queue) => queue.pop_front().unwrap_or(false),
        }
    }
}

/// Unconfigured providers fail.
#[derive(Debug, Default)]
pub(crate) struct ScriptedExecutor {
    chat: Mutex<HashMap<String, Behaviour>>,
    probe: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<Vec<(String, String)>>,
    last_request: Mutex<Option<(ChatRequest, f64, u32)>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_chat(&self, provider: &str, behaviour: Behaviour) -> &Self {
        self.chat
            .lock()
            .unwrap()
            .insert(provider.to_string(), behaviour);
        self
    }

    pub(crate) fn on_probe(&self, provider: &str, behaviour: Behaviour) -> &Self {
        self.probe
            .lock()
            .unwrap()
            .insert(provider.to_string(), behaviour);
        self
    }

    /// `(provider, model)` for every chat call, in order.
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, provider: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == provider)
            .count()
    }

    /// Request, temperature and token budget of the latest chat call.
    pub(crate) fn last_request(&self) -> Option<(ChatRequest, f64, u32)> {
        self.last_request.lock().unwrap().clone()
    }

    fn outcome(map: &Mutex<HashMap<String, Behaviour>>, provider: &str) -> bool {
        map.lock()
            .unwrap()
            .get_mut(provider)
            .map(Behaviour::next)
            .unwrap_or(false)
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        provider: &Provider,
        model: &str,
        request: &ChatRequest,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<RawCompletion, ExecutorError> {
        *self.last_request.lock().unwrap() = Some((request.clone(), temperature, max_tokens));
        self.calls
            .lock()
            .unwrap()
            .push((provider.name.clone(), model.to_string()));

        if Self::outcome(&self.chat, &provider.name) {
            Ok(RawCompletion {
                content: format!("ok from {}", provider.name),
                model: model.to_string(),
                usage: None,
                finish_reason: Some("stop".to_string()),
            })
        } else {
            Err(ExecutorError::Status {
                status: 500,
                body: format!("{} is down", provider.name),
            })
        }
    }

    async fn probe(&self, provider: &Provider) -> Result<(), ExecutorError> {
        if Self::outcome(&self.probe, &provider.name) {
            Ok(())
        } else {
            Err(ExecutorError::Network(format!("{} unreachable", provider.name)))
        }
    }
}
