//! Preference Models
//!
//! Per-user output preferences, loaded per request by the turn pipeline.

use serde::{Deserialize, Serialize};

/// Per-user output preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// The user these preferences belong to
    pub user_id: String,
    /// Explicit default mode; `None` falls back to the registry default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_output_mode_id: Option<String>,
    /// Whether queries are auto-classified into a mode
    pub auto_detect_mode: bool,
}

impl UserPreferences {
    /// Defaults for a user with no stored preferences
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            default_output_mode_id: None,
            auto_detect_mode: true,
        }
    }
}
