//! Search Models
//!
//! Result types crossing the search boundary. The gateway never throws
//! across this boundary; failures land in `SearchResult::error` so callers
//! can reason about degraded results rather than crash the turn.

use serde::{Deserialize, Serialize};

/// A single issue returned from either search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Issue key (e.g. "DS-42")
    pub key: String,
    /// One-line summary
    pub summary: String,
    /// Workflow status name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Assignee display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Issue type name (Bug, Task, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    /// Browse URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Outcome of a search operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Ordered matching issues
    pub issues: Vec<IssueSummary>,
    /// Number of matching issues
    pub count: usize,
    /// Terminal failure message, when both backends failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provenance annotation (e.g. fallback backend used)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SearchResult {
    /// A successful result
    pub fn ok(issues: Vec<IssueSummary>) -> Self {
        let count = issues.len();
        Self {
            issues,
            count,
            error: None,
            note: None,
        }
    }

    /// A terminal failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            issues: vec![],
            count: 0,
            error: Some(message.into()),
            note: None,
        }
    }

    /// Attach a provenance note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Whether the search produced a usable result
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
