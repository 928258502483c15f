//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.

use std::path::PathBuf;

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the issueflow directory (~/.issueflow/)
pub fn issueflow_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".issueflow"))
}

/// Get the config file path (~/.issueflow/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(issueflow_dir()?.join("config.json"))
}

/// Get the database file path (~/.issueflow/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(issueflow_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the issueflow directory, creating if it doesn't exist
pub fn ensure_issueflow_dir() -> AppResult<PathBuf> {
    let path = issueflow_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
