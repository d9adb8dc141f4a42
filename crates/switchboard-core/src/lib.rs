//! Core types, configuration, and utilities shared by the Switchboard crates.
//!
//! - [`types`] — chat messages, requests, responses, and wire formats
//! - [`config`] — JSON config schema + loader with env overrides
//! - [`utils`] — data paths and string helpers

pub mod config;
pub mod types;
pub mod utils;

pub use types::{ChatRequest, ChatResponse, Message, Role, UsageInfo};
