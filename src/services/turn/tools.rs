//! Search Tool Schemas
//!
//! The two tool schemas handed to the model each step, and validation of the
//! arguments the model sends back. A schema violation is a validation error
//! fed back to the model, never a crash.

use std::collections::HashMap;

use issueflow_llm::{ParameterSchema, ToolDefinition};

/// Name of the semantic search tool
pub const TOOL_SEMANTIC_SEARCH: &str = "semantic_search";

/// Name of the structured search tool
pub const TOOL_STRUCTURED_SEARCH: &str = "structured_search";

/// Validated arguments for either search tool
#[derive(Debug, Clone, PartialEq)]
pub struct SearchToolArgs {
    pub query: String,
    pub limit: u32,
}

/// The tool schemas offered to the model on every step
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_SEMANTIC_SEARCH.to_string(),
            description: "Search issues by meaning using similarity retrieval. \
                          Resilient to vague phrasing; use natural language."
                .to_string(),
            input_schema: search_schema("Natural-language description of the issues to find"),
        },
        ToolDefinition {
            name: TOOL_STRUCTURED_SEARCH.to_string(),
            description: "Search issues with a precise JQL query (exact-match structured \
                          query language). Syntax-sensitive; if it fails, prefer \
                          semantic_search on subsequent tries."
                .to_string(),
            input_schema: search_schema("JQL query, e.g. assignee = \"Jane Doe\" AND status = Open"),
        },
    ]
}

fn search_schema(query_description: &str) -> ParameterSchema {
    let mut properties = HashMap::new();
    properties.insert(
        "query".to_string(),
        ParameterSchema::string(Some(query_description)),
    );
    properties.insert(
        "limit".to_string(),
        ParameterSchema::integer(Some("Maximum number of issues to return")),
    );
    ParameterSchema::object(None, properties, vec!["query".to_string()])
}

/// Validate tool arguments against the search schema.
///
/// `query` must be a non-empty string; `limit` is optional and defaults to
/// `default_limit`. Returns a message describing the first violation.
pub fn parse_search_args(
    args: &serde_json::Value,
    default_limit: u32,
) -> Result<SearchToolArgs, String> {
    let obj = args
        .as_object()
        .ok_or_else(|| "arguments must be a JSON object".to_string())?;

    let query = obj
        .get("query")
        .and_then(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| "'query' is required and must be a non-empty string".to_string())?;

    let limit = match obj.get("limit") {
        None | Some(serde_json::Value::Null) => default_limit,
        Some(value) => value
            .as_u64()
            .filter(|l| *l > 0)
            .map(|l| l.min(u32::MAX as u64) as u32)
            .ok_or_else(|| "'limit' must be a positive integer".to_string())?,
    };

    Ok(SearchToolArgs {
        query: query.to_string(),
        limit,
    })
}
