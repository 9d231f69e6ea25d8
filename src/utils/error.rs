//! Error Handling
//!
//! Error type shared by the streaming services, configuration loading and
//! the Tauri command layer.

use study_assist_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Payload decoding failures from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Listener registration or detach failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid or unreadable streaming configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rejected caller input, e.g. an empty session id
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Tauri commands report errors as plain strings
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
