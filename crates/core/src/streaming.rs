//! Turn Stream Event Types
//!
//! Provider-agnostic event types and adapter trait for delivering one turn's
//! incremental output to a single consumer. These types are shared across the
//! LLM crate (provider implementations) and the main crate (agent loop,
//! turn pipeline).
//!
//! The stream contract is strict: events are delivered in order, and every
//! turn ends with exactly one terminal event (`Done` or `Error`). A consumer
//! observing a duplicate terminal event or events after a terminal is seeing
//! a protocol violation on the producer side.

use serde::{Deserialize, Serialize};

/// Typed event on the turn stream.
///
/// This provides a consistent interface for the client regardless of which
/// model provider produced the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// A tool invocation is about to execute
    ToolCallStart {
        tool_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// A tool invocation finished
    ToolCallResult {
        tool_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Structured result data emitted alongside text (e.g. an issue table)
    Artifact { data: serde_json::Value },

    /// Terminal: the turn completed
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },

    /// Terminal: the turn failed
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl TurnEvent {
    /// Whether this event terminates the stream.
    ///
    /// Exactly one terminal event is emitted per turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done { .. } | TurnEvent::Error { .. })
    }
}

/// Errors that can occur during stream adaptation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    InvalidFormat(String),
    /// JSON/data parsing error
    ParseError(String),
    /// Event type not supported by this adapter
    UnsupportedEvent(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AdapterError::UnsupportedEvent(msg) => write!(f, "Unsupported event: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Trait for adapting provider-specific stream formats to turn events.
///
/// Provider adapters implement this trait to provide a consistent interface
/// for stream processing.
pub trait StreamAdapter: Send + Sync {
    /// Returns the provider name for logging and identification.
    fn provider_name(&self) -> &'static str;

    /// Adapt a raw stream line/chunk to turn events.
    ///
    /// A single input line may produce zero, one, or multiple events.
    fn adapt(&mut self, input: &str) -> Result<Vec<TurnEvent>, AdapterError>;

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {
        // Default implementation does nothing
    }
}
