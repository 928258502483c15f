//! Conversation Models
//!
//! Data structures for stored conversations.

use serde::{Deserialize, Serialize};

use issueflow_core::message::ChatMessage;

/// A stored conversation: an id, a derived title, and the ordered messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier
    pub id: String,
    /// Derived title (never independently editable once messages exist)
    pub title: String,
    /// Ordered message history
    pub messages: Vec<ChatMessage>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last save timestamp (RFC 3339, non-decreasing across saves)
    pub updated_at: String,
}

/// Lightweight conversation listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: String,
    pub updated_at: String,
}
