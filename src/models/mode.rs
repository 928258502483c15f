//! Mode Models
//!
//! Data structures for output formatting modes: the patterns that auto-select
//! a mode and the system-prompt sections it contributes to a turn.

use serde::{Deserialize, Serialize};

/// Query patterns that auto-select a mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPatterns {
    /// Case-insensitive substring keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex patterns (matched case-insensitively)
    #[serde(default)]
    pub regex: Vec<String>,
    /// Evaluation priority; higher is evaluated first
    #[serde(default)]
    pub priority: i32,
}

/// System-prompt sections contributed by a mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSections {
    /// Response formatting instructions (required, non-empty)
    pub formatting: String,
    /// Behavioral instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    /// Hard constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
}

impl PromptSections {
    /// Sections with only formatting set
    pub fn formatting_only(formatting: impl Into<String>) -> Self {
        Self {
            formatting: formatting.into(),
            behavior: None,
            constraints: None,
        }
    }
}

/// A named output formatting/behavior configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    /// Unique mode identifier
    pub id: String,
    /// Unique machine name within the registry
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// What this mode is for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Patterns that auto-select this mode
    pub query_patterns: QueryPatterns,
    /// System-prompt sections applied when this mode is active
    pub prompt_sections: PromptSections,
    /// Whether this mode is the registry default
    pub is_default: bool,
    /// Owning user; `None` means system-owned (immutable by end users)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Creation timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Mode {
    /// Whether this mode is system-owned
    pub fn is_system(&self) -> bool {
        self.owner_id.is_none()
    }

    /// Assemble the system prompt from this mode's sections.
    ///
    /// Formatting always present; behavior and constraints appended when set.
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![self.prompt_sections.formatting.as_str()];
        if let Some(behavior) = self.prompt_sections.behavior.as_deref() {
            parts.push(behavior);
        }
        if let Some(constraints) = self.prompt_sections.constraints.as_deref() {
            parts.push(constraints);
        }
        parts.join("\n\n")
    }
}

/// Request to create a new mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeCreateRequest {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query_patterns: QueryPatterns,
    pub prompt_sections: PromptSections,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Request to update an existing mode (partial)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeUpdateRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub query_patterns: Option<QueryPatterns>,
    pub prompt_sections: Option<PromptSections>,
    pub is_default: Option<bool>,
}

/// Result of classifying a query against the mode set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Best-matching mode, if any
    pub mode_id: Option<String>,
    /// Match confidence in [0, 1]
    pub confidence: f32,
    /// The literal pattern or keyword responsible for the match
    pub matched_pattern: Option<String>,
}

impl ClassificationResult {
    /// The no-match result
    pub fn none() -> Self {
        Self {
            mode_id: None,
            confidence: 0.0,
            matched_pattern: None,
        }
    }
}
