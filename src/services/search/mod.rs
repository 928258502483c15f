//! Search Gateway
//!
//! Unifies the precise structured-query (JQL) backend and the approximate
//! semantic backend behind one fallback-aware interface. The gateway never
//! returns `Err` across this boundary: a turn can always reason about a
//! degraded `SearchResult` instead of crashing.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::models::search::SearchResult;

pub use http::TrackerSearchClient;

/// Provenance note attached to results served by the semantic fallback
pub const FALLBACK_NOTE: &str = "Results from vector search (JQL unavailable)";

/// The two independently fallible search operations.
///
/// Both are synchronous request/response, idempotent, side-effect-free reads;
/// backend errors come back as plain messages and the gateway decides what to
/// do with them.
#[async_trait]
pub trait IssueSearchBackend: Send + Sync {
    /// Backend name for display/logging
    fn name(&self) -> &str;

    /// Precise, syntax-sensitive structured search (JQL)
    async fn structured_search(&self, query: &str, limit: u32) -> Result<SearchResult, String>;

    /// Approximate, resilient semantic search
    async fn semantic_search(&self, text: &str, limit: u32) -> Result<SearchResult, String>;
}

/// Fallback-aware facade over the two search backends
pub struct SearchGateway {
    backend: Arc<dyn IssueSearchBackend>,
}

impl SearchGateway {
    /// Create a gateway over the given backend
    pub fn new(backend: Arc<dyn IssueSearchBackend>) -> Self {
        Self { backend }
    }

    /// Structured search with one semantic retry.
    ///
    /// On any structured failure the intent is rewritten to natural
    /// language, retried once via semantic search, narrowed to the
    /// originally-targeted assignee when one is identifiable, and tagged
    /// with a fallback note. Only when both attempts fail does the result
    /// carry a terminal `error`.
    pub async fn search(&self, structured_query: &str, limit: u32) -> SearchResult {
        match self.backend.structured_search(structured_query, limit).await {
            Ok(result) if result.is_success() => {
                debug!(backend = self.backend.name(), count = result.count, "structured search ok");
                result
            }
            Ok(result) => {
                let cause = result
                    .error
                    .unwrap_or_else(|| "structured search returned an error".to_string());
                self.fallback(structured_query, limit, cause).await
            }
            Err(cause) => self.fallback(structured_query, limit, cause).await,
        }
    }

    /// Direct semantic search; failures are absorbed into the result
    pub async fn semantic(&self, text: &str, limit: u32) -> SearchResult {
        match self.backend.semantic_search(text, limit).await {
            Ok(result) => result,
            Err(message) => SearchResult::failed(message),
        }
    }

    async fn fallback(&self, structured_query: &str, limit: u32, cause: String) -> SearchResult {
        warn!(%cause, "structured search failed; retrying via semantic search");
        let intent = rewrite_intent(structured_query);

        match self.backend.semantic_search(&intent, limit).await {
            Ok(mut result) if result.is_success() => {
                if let Some(assignee) = extract_quoted_field(structured_query, "assignee") {
                    result
                        .issues
                        .retain(|issue| issue.assignee.as_deref() == Some(assignee.as_str()));
                    result.count = result.issues.len();
                }
                result.with_note(FALLBACK_NOTE)
            }
            Ok(result) => SearchResult::failed(format!(
                "structured search failed ({}); semantic fallback failed ({})",
                cause,
                result
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            )),
            Err(fallback_cause) => SearchResult::failed(format!(
                "structured search failed ({}); semantic fallback failed ({})",
                cause, fallback_cause
            )),
        }
    }
}

/// Rewrite a structured query into a natural-language search intent.
///
/// Targets the subjects a JQL query names: the assignee first, then the
/// project; otherwise the query is stripped down to its bare words.
pub fn rewrite_intent(structured_query: &str) -> String {
    if let Some(assignee) = extract_quoted_field(structured_query, "assignee") {
        return format!("issues assigned to {}", assignee);
    }
    if let Some(project) = extract_field(structured_query, "project") {
        return format!("issues in project {}", project);
    }

    // Strip operators and connectives down to plain words
    let words: Vec<&str> = structured_query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| {
            let lower = w.to_lowercase();
            lower != "and" && lower != "or" && lower != "not" && lower != "order" && lower != "by"
        })
        .collect();
    if words.is_empty() {
        structured_query.to_string()
    } else {
        words.join(" ")
    }
}

/// Extract a quoted field value, e.g. `assignee = "Jane Doe"`.
fn extract_quoted_field(query: &str, field: &str) -> Option<String> {
    let pattern = format!(r#"(?i)\b{}\s*=\s*"([^"]+)""#, field);
    let re = Regex::new(&pattern).ok()?;
    re.captures(query).map(|c| c[1].to_string())
}

/// Extract a bare or quoted field value, e.g. `project = DS`.
fn extract_field(query: &str, field: &str) -> Option<String> {
    if let Some(value) = extract_quoted_field(query, field) {
        return Some(value);
    }
    let pattern = format!(r#"(?i)\b{}\s*=\s*([A-Za-z0-9_-]+)"#, field);
    let re = Regex::new(&pattern).ok()?;
    re.captures(query).map(|c| c[1].to_string())
}
