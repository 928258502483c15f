//! Conversation Message Model
//!
//! The message/part model persisted per conversation and replayed into the
//! agent loop on every turn. Part order within a message and message order
//! within a conversation are significant and must be preserved exactly.

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

/// A typed part within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text content
    Text { text: String },

    /// A tool invocation with its (eventual) result
    ToolInvocation {
        name: String,
        args: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    /// Structured result data (e.g. aggregation/chart data)
    Artifact { data: serde_json::Value },
}

/// A message in a conversation: a role and an ordered sequence of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    /// Create a message with a single text part
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(ChatRole::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, text)
    }

    /// Create an assistant message from pre-assembled parts
    pub fn assistant_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: ChatRole::Assistant,
            parts,
        }
    }

    /// Concatenated text of all `Text` parts, in order
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
