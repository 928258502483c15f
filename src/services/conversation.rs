//! Conversation Store
//!
//! Keyed persistence of message history per conversation, plus the one-shot
//! migration of the legacy single-array message format.

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::warn;
use uuid::Uuid;

use issueflow_core::message::{ChatMessage, ChatRole};

use crate::models::conversation::{Conversation, ConversationMeta};
use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

/// Maximum title length before truncation
const TITLE_MAX_LEN: usize = 50;

/// Title used when no user text exists yet
const DEFAULT_TITLE: &str = "New Conversation";

/// Settings key holding the pre-conversation message blob
const LEGACY_MESSAGES_KEY: &str = "legacy_chat_messages";

/// Service for managing conversations
pub struct ConversationService {
    pool: DbPool,
    db: Database,
}

impl ConversationService {
    /// Create from a Database reference
    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            db: db.clone(),
        }
    }

    /// Create a new ConversationService with a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            db: Database::from_pool(pool.clone()),
            pool,
        }
    }

    /// Create a fresh, empty conversation
    pub fn create(&self) -> AppResult<Conversation> {
        let now = now_rfc3339();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: vec![],
            created_at: now.clone(),
            updated_at: now,
        };
        self.persist(&conversation)?;
        Ok(conversation)
    }

    /// Upsert a conversation.
    ///
    /// Always stamps `updated_at = now` and re-derives the title from the
    /// messages (the title is derived, never independently editable).
    pub fn save(&self, conversation: &mut Conversation) -> AppResult<()> {
        conversation.updated_at = now_rfc3339();
        conversation.title = generate_title(&conversation.messages);
        self.persist(conversation)
    }

    fn persist(&self, conversation: &Conversation) -> AppResult<()> {
        let messages_json = serde_json::to_string(&conversation.messages)?;
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "INSERT INTO conversations (id, title, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = ?2, messages = ?3, updated_at = ?5",
            rusqlite::params![
                conversation.id,
                conversation.title,
                messages_json,
                conversation.created_at,
                conversation.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a conversation by ID
    pub fn get(&self, id: &str) -> AppResult<Option<Conversation>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let row = conn
            .query_row(
                "SELECT id, title, messages, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, title, messages_json, created_at, updated_at)) => {
                let messages: Vec<ChatMessage> = serde_json::from_str(&messages_json)?;
                Ok(Some(Conversation {
                    id,
                    title,
                    messages,
                    created_at,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Delete a conversation by ID
    pub fn delete(&self, id: &str) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let affected = conn.execute(
            "DELETE FROM conversations WHERE id = ?1",
            rusqlite::params![id],
        )?;
        if affected == 0 {
            return Err(AppError::not_found(format!("conversation {}", id)));
        }
        Ok(())
    }

    /// List conversation metadata, most recently updated first
    pub fn list_metadata(&self) -> AppResult<Vec<ConversationMeta>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, messages, created_at, updated_at
             FROM conversations ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut metas = Vec::new();
        for row in rows {
            let (id, title, messages_json, created_at, updated_at) = row?;
            let message_count = serde_json::from_str::<Vec<ChatMessage>>(&messages_json)
                .map(|m| m.len())
                .unwrap_or(0);
            metas.push(ConversationMeta {
                id,
                title,
                message_count,
                created_at,
                updated_at,
            });
        }
        Ok(metas)
    }

    /// One-shot migration of the legacy single-array message format.
    ///
    /// Wraps a non-empty legacy message list into one saved conversation.
    /// The legacy key is removed unconditionally — parse failure included —
    /// so migration is never retried.
    pub fn migrate_legacy(&self) -> AppResult<Option<Conversation>> {
        let raw = match self.db.get_setting(LEGACY_MESSAGES_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let migrated = match serde_json::from_str::<Vec<ChatMessage>>(&raw) {
            Ok(messages) if !messages.is_empty() => {
                let now = now_rfc3339();
                let mut conversation = Conversation {
                    id: Uuid::new_v4().to_string(),
                    title: DEFAULT_TITLE.to_string(),
                    messages,
                    created_at: now.clone(),
                    updated_at: now,
                };
                self.save(&mut conversation)?;
                Some(conversation)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "legacy chat messages were unparseable; dropping them");
                None
            }
        };

        self.db.delete_setting(LEGACY_MESSAGES_KEY)?;
        Ok(migrated)
    }
}

/// Derive a conversation title from its messages.
///
/// Takes the first user message's concatenated text parts, collapses
/// whitespace, and truncates to 50 characters with an ellipsis.
pub fn generate_title(messages: &[ChatMessage]) -> String {
    let text = messages
        .iter()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.text_content())
        .unwrap_or_default();

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if collapsed.chars().count() > TITLE_MAX_LEN {
        let truncated: String = collapsed.chars().take(TITLE_MAX_LEN).collect();
        format!("{}...", truncated)
    } else {
        collapsed
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
