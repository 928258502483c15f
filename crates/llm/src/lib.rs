//! Issueflow LLM
//!
//! The model boundary for the turn pipeline: a provider trait, the
//! request/response types that cross it, an OpenAI-compatible HTTP provider
//! (chat-completions wire format with SSE streaming), and a scripted
//! provider for deterministic tests.
//!
//! The core never retries this boundary automatically; provider failures
//! surface to the caller as terminal error events on the turn stream.

pub mod openai;
pub mod provider;
pub mod scripted;
pub mod types;

// Re-export main types
pub use openai::OpenAiCompatProvider;
pub use provider::{missing_api_key_error, parse_http_error, ModelProvider};
pub use scripted::{ScriptedProvider, ScriptedStep};
pub use types::*;
