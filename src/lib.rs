//! Issueflow - Streaming Issue-Tracker Chat Pipeline
//!
//! Turns one natural-language query about an issue tracker into a streamed,
//! tool-grounded answer:
//! - classifies the query against configurable formatting modes
//! - drives a bounded tool-calling loop over a precise structured-query (JQL)
//!   backend and an approximate semantic backend, with automatic fallback
//! - streams incremental output while preserving per-conversation history
//!
//! Layers:
//! - `models` - data models (modes, conversations, preferences, search, config)
//! - `services` - classifier, mode registry, search gateway, conversation
//!   store, preferences, and the turn pipeline
//! - `storage` - SQLite database and JSON configuration
//! - `utils` - error types and path helpers

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export the pipeline surface
pub use models::mode::{ClassificationResult, Mode};
pub use services::classifier::classify;
pub use services::conversation::ConversationService;
pub use services::modes::ModeService;
pub use services::preferences::PreferenceService;
pub use services::search::SearchGateway;
pub use services::turn::{TurnOutcome, TurnRequest, TurnRunner, TurnService};
pub use storage::Database;
pub use utils::error::{AppError, AppResult};
