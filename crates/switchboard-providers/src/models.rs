//! Model alias resolution.
//!
//! A logical alias (`default`, `coder`, `planner`) or a concrete model id is
//! turned into the id a given provider understands. Per-provider aliases from
//! config sit above a small built-in table.

use switchboard_core::types::DEFAULT_MODEL_ALIAS;

use crate::provider::Provider;

/// Built-in `(provider, alias) → model` table.
static BUILTIN_ALIASES: &[(&str, &str, &str)] = &[
    ("groq", "default", "llama-3.1-8b-instant"),
    ("groq", "coder", "llama-3.1-8b-instant"),
    ("groq", "planner", "mixtral-8x7b-32768"),
    ("openrouter", "default", "mistralai/mistral-7b-instruct"),
    ("openrouter", "coder", "codellama/codellama-70b-instruct"),
    ("openrouter", "planner", "anthropic/claude-3-sonnet"),
    ("anthropic", "default", "claude-3-sonnet-20240229"),
    ("anthropic", "coder", "claude-3-sonnet-20240229"),
    ("anthropic", "planner", "claude-3-sonnet-20240229"),
    ("openai", "default", "gpt-3.5-turbo"),
    ("openai", "coder", "gpt-3.5-turbo"),
    ("openai", "planner", "gpt-4"),
];

/// Resolves model aliases per provider. Stateless.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelMapper;

impl ModelMapper {
    pub fn new() -> Self {
        ModelMapper
    }

    /// Resolve `alias` for `provider`.
    ///
    /// Order: mapped entry for the alias, the alias itself when the provider
    /// declares it, the provider's `default` entry, the first declared model.
    /// Returns `""` only for a provider with no models, which the registry
    /// never admits.
    pub fn resolve(&self, alias: &str, provider: &Provider) -> String {
        if let Some(model) = lookup(provider, alias) {
            return model;
        }
        if provider.models.iter().any(|m| m == alias) {
            return alias.to_string();
        }
        if let Some(model) = lookup(provider, DEFAULT_MODEL_ALIAS) {
            return model;
        }
        provider.models.first().cloned().unwrap_or_default()
    }
}

fn lookup(provider: &Provider, alias: &str) -> Option<String> {
    if let Some(model) = provider.aliases.get(alias) {
        return Some(model.clone());
    }
    BUILTIN_ALIASES
        .iter()
        .find(|(name, a, _)| *name == provider.name && *a == alias)
        .map(|(_, _, model)| model.to_string())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
