//! Tracker Search Client
//!
//! HTTP implementation of the search backend: structured queries go to the
//! tracker's JQL REST endpoint, semantic queries to the vector search
//! service. Responses are extracted leniently from JSON so schema drift on
//! optional fields does not fail a whole search.

use async_trait::async_trait;

use crate::models::search::{IssueSummary, SearchResult};
use crate::models::settings::TrackerSettings;

use super::IssueSearchBackend;

/// Request timeout for search calls
const SEARCH_TIMEOUT_SECS: u64 = 15;

/// HTTP search backend over the tracker REST API and vector service
pub struct TrackerSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    vector_url: String,
}

impl TrackerSearchClient {
    /// Create a new client from tracker settings
    pub fn new(settings: &TrackerSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .user_agent("issueflow/0.1")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone(),
            vector_url: settings.vector_search_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }
}

#[async_trait]
impl IssueSearchBackend for TrackerSearchClient {
    fn name(&self) -> &str {
        "tracker-http"
    }

    async fn structured_search(&self, query: &str, limit: u32) -> Result<SearchResult, String> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("jql", query), ("maxResults", &limit.to_string())]);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| format!("JQL search request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("JQL search error ({}): {}", status.as_u16(), body));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse JQL search response: {}", e))?;

        Ok(SearchResult::ok(parse_jql_issues(&data, &self.base_url)))
    }

    async fn semantic_search(&self, text: &str, limit: u32) -> Result<SearchResult, String> {
        let url = format!("{}/search", self.vector_url);
        let body = serde_json::json!({
            "query": text,
            "limit": limit,
        });

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| format!("Vector search request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "Vector search error ({}): {}",
                status.as_u16(),
                body
            ));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse vector search response: {}", e))?;

        Ok(SearchResult::ok(parse_vector_issues(&data)))
    }
}

/// Extract issues from a JQL search response
fn parse_jql_issues(data: &serde_json::Value, base_url: &str) -> Vec<IssueSummary> {
    data.get("issues")
        .and_then(|i| i.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let key = item.get("key").and_then(|k| k.as_str())?;
                    let fields = item.get("fields");
                    let field_str = |name: &str| {
                        fields
                            .and_then(|f| f.get(name))
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string())
                    };
                    let nested_str = |name: &str, inner: &str| {
                        fields
                            .and_then(|f| f.get(name))
                            .and_then(|v| v.get(inner))
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string())
                    };
                    Some(IssueSummary {
                        key: key.to_string(),
                        summary: field_str("summary").unwrap_or_default(),
                        status: nested_str("status", "name"),
                        assignee: nested_str("assignee", "displayName"),
                        issue_type: nested_str("issuetype", "name"),
                        url: Some(format!("{}/browse/{}", base_url, key)),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract issues from a vector search response
fn parse_vector_issues(data: &serde_json::Value) -> Vec<IssueSummary> {
    data.get("results")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let key = item.get("key").and_then(|k| k.as_str())?;
                    let get_str = |name: &str| {
                        item.get(name)
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string())
                    };
                    Some(IssueSummary {
                        key: key.to_string(),
                        summary: get_str("summary").unwrap_or_default(),
                        status: get_str("status"),
                        assignee: get_str("assignee"),
                        issue_type: get_str("issue_type"),
                        url: get_str("url"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
