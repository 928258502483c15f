//! Preference Service
//!
//! Per-user output preferences, upserted on every explicit user change and
//! loaded per request by the turn pipeline.

use rusqlite::OptionalExtension;

use crate::models::preferences::UserPreferences;
use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

/// Service for managing user preferences
pub struct PreferenceService {
    pool: DbPool,
}

impl PreferenceService {
    /// Create a new PreferenceService with a database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create from a Database reference
    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Get a user's preferences, falling back to defaults when absent
    pub fn get(&self, user_id: &str) -> AppResult<UserPreferences> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        let stored = conn
            .query_row(
                "SELECT user_id, default_output_mode_id, auto_detect_mode
                 FROM preferences WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| {
                    Ok(UserPreferences {
                        user_id: row.get(0)?,
                        default_output_mode_id: row.get(1)?,
                        auto_detect_mode: row.get::<_, i32>(2)? != 0,
                    })
                },
            )
            .optional()?;

        Ok(stored.unwrap_or_else(|| UserPreferences::for_user(user_id)))
    }

    /// Upsert a user's preferences
    pub fn update(&self, prefs: &UserPreferences) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "INSERT INTO preferences (user_id, default_output_mode_id, auto_detect_mode)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                default_output_mode_id = ?2,
                auto_detect_mode = ?3,
                updated_at = datetime('now')",
            rusqlite::params![
                prefs.user_id,
                prefs.default_output_mode_id,
                prefs.auto_detect_mode as i32,
            ],
        )?;
        Ok(())
    }
}
