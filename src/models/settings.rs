//! Settings Models
//!
//! Application configuration and settings data structures.

use serde::{Deserialize, Serialize};

use issueflow_llm::ModelConfig;

/// Issue tracker search backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Base URL of the issue tracker REST API
    pub base_url: String,
    /// API token for the tracker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Base URL of the vector search service
    pub vector_search_url: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_token: None,
            vector_search_url: "http://localhost:8090".to_string(),
        }
    }
}

/// Turn pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSettings {
    /// Hard cap on tool-issuing iterations per turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Default result limit for search tool calls
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
}

fn default_max_steps() -> u32 {
    5
}

fn default_search_limit() -> u32 {
    10
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            search_limit: default_search_limit(),
        }
    }
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Issue tracker search backends
    #[serde(default)]
    pub tracker: TrackerSettings,
    /// Model provider configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Turn pipeline settings
    #[serde(default)]
    pub turn: TurnSettings,
}

impl AppConfig {
    /// Validate the configuration, returning a message for the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.tracker.base_url.trim().is_empty() {
            return Err("tracker.base_url must not be empty".to_string());
        }
        if self.tracker.vector_search_url.trim().is_empty() {
            return Err("tracker.vector_search_url must not be empty".to_string());
        }
        if self.model.model.trim().is_empty() {
            return Err("model.model must not be empty".to_string());
        }
        if self.turn.max_steps == 0 {
            return Err("turn.max_steps must be at least 1".to_string());
        }
        Ok(())
    }

    /// Apply a partial settings update
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(tracker) = update.tracker {
            self.tracker = tracker;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(turn) = update.turn {
            self.turn = turn;
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub tracker: Option<TrackerSettings>,
    pub model: Option<ModelConfig>,
    pub turn: Option<TurnSettings>,
}
