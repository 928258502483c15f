//! Turn Pipeline
//!
//! The request-to-response pipeline: a query enters, the mode is selected
//! (classification or preference), the agent loop runs against the search
//! gateway, output streams to the caller, and the full turn's messages are
//! appended to the conversation store.
//!
//! Each turn runs as an independent asynchronous task. The only resources
//! shared across turns are the mode registry, conversation store, and
//! preference store — synchronous read/write boundaries with last-write-wins
//! semantics.

pub mod runner;
pub mod tools;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use issueflow_core::message::ChatMessage;
use issueflow_core::streaming::TurnEvent;
use issueflow_llm::{ModelProvider, OpenAiCompatProvider};

use crate::models::mode::Mode;
use crate::models::preferences::UserPreferences;
use crate::models::settings::{AppConfig, TurnSettings};
use crate::services::classifier::classify;
use crate::services::conversation::ConversationService;
use crate::services::modes::ModeService;
use crate::services::preferences::PreferenceService;
use crate::services::search::{SearchGateway, TrackerSearchClient};
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

pub use runner::{TurnOutcome, TurnRunner};
pub use tools::{tool_definitions, TOOL_SEMANTIC_SEARCH, TOOL_STRUCTURED_SEARCH};

/// Minimum classification confidence before auto-detect trusts the match
pub const CLASSIFY_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// One user turn entering the pipeline
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// The requesting user (preferences are loaded per request)
    pub user_id: String,
    /// Existing conversation to continue; `None` starts a new one
    pub conversation_id: Option<String>,
    /// The natural-language query
    pub query: String,
}

/// The full turn pipeline over the shared stores
pub struct TurnService {
    db: Database,
    gateway: Arc<SearchGateway>,
    provider: Arc<dyn ModelProvider>,
    settings: TurnSettings,
}

impl TurnService {
    /// Create the pipeline over its collaborators
    pub fn new(
        db: Database,
        gateway: Arc<SearchGateway>,
        provider: Arc<dyn ModelProvider>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            db,
            gateway,
            provider,
            settings,
        }
    }

    /// Wire the pipeline from application configuration: the HTTP search
    /// backend behind the gateway and the OpenAI-compatible model provider.
    pub fn from_config(db: Database, config: &AppConfig) -> Self {
        let gateway = Arc::new(SearchGateway::new(Arc::new(TrackerSearchClient::new(
            &config.tracker,
        ))));
        let provider = Arc::new(OpenAiCompatProvider::new(config.model.clone()));
        Self::new(db, gateway, provider, config.turn.clone())
    }

    /// Run one turn end to end.
    ///
    /// Streams events on `tx` and persists the turn's messages — including
    /// partial output when the turn failed partway — before returning.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        tx: mpsc::Sender<TurnEvent>,
        cancellation_token: CancellationToken,
    ) -> AppResult<TurnOutcome> {
        if request.query.trim().is_empty() {
            return Err(AppError::validation("query must not be empty"));
        }

        let preferences = PreferenceService::from_database(&self.db).get(&request.user_id)?;
        let mode = self.select_mode(&request.query, &preferences)?;
        debug!(mode = %mode.name, user = %request.user_id, "mode selected");

        let conversations = ConversationService::from_database(&self.db);
        let mut conversation = match &request.conversation_id {
            Some(id) => conversations
                .get(id)?
                .ok_or_else(|| AppError::not_found(format!("conversation {}", id)))?,
            None => conversations.create()?,
        };

        conversation.messages.push(ChatMessage::user(&request.query));

        let runner = TurnRunner::new(
            self.provider.clone(),
            self.gateway.clone(),
            self.settings.clone(),
            cancellation_token,
        );
        let mut outcome = runner.run(&mode, &conversation.messages, tx).await;

        // A failed turn still persists whatever parts were produced
        conversation.messages.push(outcome.message.clone());
        conversations.save(&mut conversation)?;

        outcome.conversation_id = Some(conversation.id);
        Ok(outcome)
    }

    /// Select the mode for a query: auto-detect via classification when
    /// enabled (0.3 threshold), else the user's preferred default, else the
    /// registry default.
    fn select_mode(&self, query: &str, preferences: &UserPreferences) -> AppResult<Mode> {
        let modes_service = ModeService::from_database(&self.db);
        let modes = modes_service.list()?;

        if preferences.auto_detect_mode {
            let classification = classify(query, &modes);
            if classification.confidence >= CLASSIFY_CONFIDENCE_THRESHOLD {
                if let Some(mode_id) = &classification.mode_id {
                    if let Some(mode) = modes.iter().find(|m| &m.id == mode_id) {
                        debug!(
                            mode = %mode.name,
                            confidence = classification.confidence,
                            pattern = classification.matched_pattern.as_deref().unwrap_or(""),
                            "query auto-classified"
                        );
                        return Ok(mode.clone());
                    }
                }
            }
        }

        if let Some(mode_id) = &preferences.default_output_mode_id {
            if let Some(mode) = modes_service.get(mode_id)? {
                return Ok(mode);
            }
        }

        modes_service.get_default()
    }
}
