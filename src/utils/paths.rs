//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the Study Assist directory (~/.study-assist/)
pub fn study_assist_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".study-assist"))
}

/// Get the streaming config file path (~/.study-assist/streaming.json)
pub fn streaming_config_path() -> AppResult<PathBuf> {
    Ok(study_assist_dir()?.join("streaming.json"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
