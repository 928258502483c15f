//! Mode Registry
//!
//! CRUD store of output formatting modes. System-owned modes (owner_id NULL)
//! are seeded at startup and can be cloned but never mutated or deleted by
//! end users. The registry is never empty once seeded.

use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::models::mode::{
    Mode, ModeCreateRequest, ModeUpdateRequest, PromptSections, QueryPatterns,
};
use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

const MODE_COLUMNS: &str = "id, name, display_name, description, keywords, regex, priority,
                            formatting, behavior, constraints, is_default, owner_id,
                            created_at, updated_at";

/// Service for managing output modes
pub struct ModeService {
    pool: DbPool,
}

impl ModeService {
    /// Create a new ModeService with a database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create from a Database reference
    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn conn(&self) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Seed built-in system modes if none exist.
    ///
    /// Bootstraps the registry so `get_default()` can never come up empty.
    pub fn seed_builtins(&self) -> AppResult<()> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM modes WHERE owner_id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if count > 0 {
            return Ok(());
        }

        struct Builtin {
            id: &'static str,
            name: &'static str,
            display_name: &'static str,
            description: &'static str,
            keywords: &'static [&'static str],
            regex: &'static [&'static str],
            priority: i32,
            formatting: &'static str,
            behavior: Option<&'static str>,
            constraints: Option<&'static str>,
            is_default: bool,
        }

        let builtins = [
            Builtin {
                id: "builtin-default",
                name: "default",
                display_name: "Default",
                description: "Concise prose answers",
                keywords: &[],
                regex: &[],
                priority: 0,
                formatting: "Answer in concise Markdown prose. Reference issues by key.",
                behavior: Some("Lead with the direct answer, then supporting detail."),
                constraints: None,
                is_default: true,
            },
            Builtin {
                id: "builtin-table",
                name: "table",
                display_name: "Issue Table",
                description: "Tabular listings of issues",
                keywords: &["list", "table", "show me", "all issues", "bugs"],
                regex: &[r"(?i)\b(list|show)\b.+\b(issues|bugs|tickets)\b"],
                priority: 10,
                formatting: "Render matching issues as a Markdown table with columns: Key, Summary, Status, Assignee.",
                behavior: None,
                constraints: Some("Never invent issue keys that were not returned by a search."),
                is_default: false,
            },
            Builtin {
                id: "builtin-chart",
                name: "chart",
                display_name: "Chart",
                description: "Aggregated counts and distributions",
                keywords: &["chart", "graph", "distribution", "breakdown", "count by"],
                regex: &[],
                priority: 8,
                formatting: "Aggregate the results and describe the distribution; the issue-table artifact carries the raw data.",
                behavior: None,
                constraints: None,
                is_default: false,
            },
            Builtin {
                id: "builtin-summary",
                name: "summary",
                display_name: "Summary",
                description: "Narrative status summaries",
                keywords: &["summarize", "summary", "overview", "report", "status of"],
                regex: &[],
                priority: 5,
                formatting: "Write a short narrative summary with bullet points for notable issues.",
                behavior: Some("Group related issues together rather than listing them one by one."),
                constraints: None,
                is_default: false,
            },
        ];

        for builtin in &builtins {
            let keywords_json = serde_json::to_string(builtin.keywords)?;
            let regex_json = serde_json::to_string(builtin.regex)?;
            conn.execute(
                "INSERT OR IGNORE INTO modes (id, name, display_name, description, keywords, regex,
                                              priority, formatting, behavior, constraints,
                                              is_default, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)",
                rusqlite::params![
                    builtin.id,
                    builtin.name,
                    builtin.display_name,
                    builtin.description,
                    keywords_json,
                    regex_json,
                    builtin.priority,
                    builtin.formatting,
                    builtin.behavior,
                    builtin.constraints,
                    builtin.is_default as i32,
                ],
            )?;
        }

        Ok(())
    }

    /// List all modes in registration order
    pub fn list(&self) -> AppResult<Vec<Mode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM modes ORDER BY rowid ASC",
            MODE_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| Ok(row_to_mode(row)))?;

        let mut modes = Vec::new();
        for row in rows {
            modes.push(row?);
        }
        Ok(modes)
    }

    /// Get a single mode by ID
    pub fn get(&self, id: &str) -> AppResult<Option<Mode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM modes WHERE id = ?1",
            MODE_COLUMNS
        ))?;
        let result = stmt
            .query_row(rusqlite::params![id], |row| Ok(row_to_mode(row)))
            .optional()?;
        Ok(result)
    }

    /// Create a new mode.
    ///
    /// Validation (name collision, empty formatting) happens before any write.
    pub fn create(&self, req: ModeCreateRequest) -> AppResult<Mode> {
        if req.prompt_sections.formatting.trim().is_empty() {
            return Err(AppError::validation(
                "prompt_sections.formatting must not be empty",
            ));
        }
        if req.name.trim().is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }

        let conn = self.conn()?;
        let collision: i64 = conn.query_row(
            "SELECT COUNT(*) FROM modes WHERE name = ?1",
            rusqlite::params![req.name],
            |row| row.get(0),
        )?;
        if collision > 0 {
            return Err(AppError::validation(format!(
                "a mode named '{}' already exists",
                req.name
            )));
        }

        let id = Uuid::new_v4().to_string();
        let keywords_json = serde_json::to_string(&req.query_patterns.keywords)?;
        let regex_json = serde_json::to_string(&req.query_patterns.regex)?;

        conn.execute(
            "INSERT INTO modes (id, name, display_name, description, keywords, regex, priority,
                                formatting, behavior, constraints, is_default, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                id,
                req.name,
                req.display_name,
                req.description,
                keywords_json,
                regex_json,
                req.query_patterns.priority,
                req.prompt_sections.formatting,
                req.prompt_sections.behavior,
                req.prompt_sections.constraints,
                req.is_default as i32,
                req.owner_id,
            ],
        )?;
        drop(conn);

        self.get(&id)?
            .ok_or_else(|| AppError::database("Failed to retrieve created mode"))
    }

    /// Update an existing mode.
    ///
    /// System-owned modes are immutable; clone them instead.
    pub fn update(&self, id: &str, req: ModeUpdateRequest) -> AppResult<Mode> {
        let existing = self
            .get(id)?
            .ok_or_else(|| AppError::not_found(format!("mode {}", id)))?;
        if existing.is_system() {
            return Err(AppError::permission(format!(
                "mode '{}' is system-owned; clone it instead",
                existing.name
            )));
        }

        let display_name = req.display_name.unwrap_or(existing.display_name);
        let description = req.description.or(existing.description);
        let query_patterns = req.query_patterns.unwrap_or(existing.query_patterns);
        let prompt_sections = req.prompt_sections.unwrap_or(existing.prompt_sections);
        let is_default = req.is_default.unwrap_or(existing.is_default);

        if prompt_sections.formatting.trim().is_empty() {
            return Err(AppError::validation(
                "prompt_sections.formatting must not be empty",
            ));
        }

        let keywords_json = serde_json::to_string(&query_patterns.keywords)?;
        let regex_json = serde_json::to_string(&query_patterns.regex)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE modes SET display_name = ?1, description = ?2, keywords = ?3, regex = ?4,
                              priority = ?5, formatting = ?6, behavior = ?7, constraints = ?8,
                              is_default = ?9, updated_at = datetime('now')
             WHERE id = ?10",
            rusqlite::params![
                display_name,
                description,
                keywords_json,
                regex_json,
                query_patterns.priority,
                prompt_sections.formatting,
                prompt_sections.behavior,
                prompt_sections.constraints,
                is_default as i32,
                id,
            ],
        )?;
        drop(conn);

        self.get(id)?
            .ok_or_else(|| AppError::database("Failed to retrieve updated mode"))
    }

    /// Delete a mode (refuses to delete system-owned modes)
    pub fn delete(&self, id: &str) -> AppResult<()> {
        let existing = self
            .get(id)?
            .ok_or_else(|| AppError::not_found(format!("mode {}", id)))?;
        if existing.is_system() {
            return Err(AppError::permission(format!(
                "mode '{}' is system-owned and cannot be deleted",
                existing.name
            )));
        }

        let conn = self.conn()?;
        conn.execute("DELETE FROM modes WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
    }

    /// Clone any mode (system or user) under a new owner.
    ///
    /// The copy gets a disambiguated unique name and never inherits the
    /// default flag. Always succeeds for a valid source id.
    pub fn clone_mode(&self, id: &str, owner_id: &str) -> AppResult<Mode> {
        let source = self
            .get(id)?
            .ok_or_else(|| AppError::not_found(format!("mode {}", id)))?;

        let name = self.disambiguated_name(&source.name)?;
        let new_id = Uuid::new_v4().to_string();
        let keywords_json = serde_json::to_string(&source.query_patterns.keywords)?;
        let regex_json = serde_json::to_string(&source.query_patterns.regex)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO modes (id, name, display_name, description, keywords, regex, priority,
                                formatting, behavior, constraints, is_default, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)",
            rusqlite::params![
                new_id,
                name,
                format!("{} (Copy)", source.display_name),
                source.description,
                keywords_json,
                regex_json,
                source.query_patterns.priority,
                source.prompt_sections.formatting,
                source.prompt_sections.behavior,
                source.prompt_sections.constraints,
                owner_id,
            ],
        )?;
        drop(conn);

        self.get(&new_id)?
            .ok_or_else(|| AppError::database("Failed to retrieve cloned mode"))
    }

    /// Get the default mode: the first mode flagged `is_default` by
    /// registration order, else the first registered mode.
    pub fn get_default(&self) -> AppResult<Mode> {
        let conn = self.conn()?;

        let flagged = conn
            .query_row(
                &format!(
                    "SELECT {} FROM modes WHERE is_default = 1 ORDER BY rowid ASC LIMIT 1",
                    MODE_COLUMNS
                ),
                [],
                |row| Ok(row_to_mode(row)),
            )
            .optional()?;
        if let Some(mode) = flagged {
            return Ok(mode);
        }

        conn.query_row(
            &format!("SELECT {} FROM modes ORDER BY rowid ASC LIMIT 1", MODE_COLUMNS),
            [],
            |row| Ok(row_to_mode(row)),
        )
        .optional()?
        .ok_or_else(|| AppError::internal("mode registry is empty; seed_builtins was not run"))
    }

    /// Find a collision-free name derived from `base`.
    fn disambiguated_name(&self, base: &str) -> AppResult<String> {
        let conn = self.conn()?;
        let exists = |name: &str| -> AppResult<bool> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM modes WHERE name = ?1",
                rusqlite::params![name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        };

        let candidate = format!("{}-copy", base);
        if !exists(&candidate)? {
            return Ok(candidate);
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{}-copy-{}", base, n);
            if !exists(&candidate)? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

/// Convert a database row to a Mode
fn row_to_mode(row: &rusqlite::Row) -> Mode {
    let keywords_str: String = row.get::<_, String>(4).unwrap_or_else(|_| "[]".to_string());
    let regex_str: String = row.get::<_, String>(5).unwrap_or_else(|_| "[]".to_string());

    Mode {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        display_name: row.get(2).unwrap_or_default(),
        description: row.get(3).unwrap_or(None),
        query_patterns: QueryPatterns {
            keywords: serde_json::from_str(&keywords_str).unwrap_or_default(),
            regex: serde_json::from_str(&regex_str).unwrap_or_default(),
            priority: row.get(6).unwrap_or(0),
        },
        prompt_sections: PromptSections {
            formatting: row.get(7).unwrap_or_default(),
            behavior: row.get(8).unwrap_or(None),
            constraints: row.get(9).unwrap_or(None),
        },
        is_default: row.get::<_, i32>(10).unwrap_or(0) != 0,
        owner_id: row.get(11).unwrap_or(None),
        created_at: row.get(12).unwrap_or(None),
        updated_at: row.get(13).unwrap_or(None),
    }
}
