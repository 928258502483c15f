//! Model Provider Trait
//!
//! Defines the common interface for all model providers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{
    ModelError, ModelMessage, ModelRequestOptions, ModelResponse, ModelResult, ToolDefinition,
};
use issueflow_core::streaming::TurnEvent;

/// Trait that all model providers must implement.
///
/// Provides a unified interface for:
/// - Single message completions (send_message)
/// - Streaming completions (stream_message)
/// - Health checking
///
/// The turn pipeline never retries this boundary; any error returned here
/// surfaces as a terminal error event on the turn stream.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Send a message and get a complete response.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `system` - Optional system prompt
    /// * `tools` - Available tools for the model to use
    async fn send_message(
        &self,
        messages: Vec<ModelMessage>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse>;

    /// Stream a message response via a channel.
    ///
    /// Emits `text_delta` events on `tx` as they arrive and resolves to the
    /// final complete response. Send failures on `tx` (consumer gone) are
    /// not errors at this boundary; the caller notices the closed channel
    /// and stops the turn.
    async fn stream_message(
        &self,
        messages: Vec<ModelMessage>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        tx: mpsc::Sender<TurnEvent>,
        options: ModelRequestOptions,
    ) -> ModelResult<ModelResponse>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> ModelResult<()>;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> ModelError {
    ModelError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> ModelError {
    match status {
        401 => ModelError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => ModelError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        429 => ModelError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => ModelError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => ModelError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => ModelError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
