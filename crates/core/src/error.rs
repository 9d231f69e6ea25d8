//! Core Error Types
//!
//! Errors raised while decoding stream payloads. The application crate wraps
//! these in `AppError` together with transport, config and I/O failures.

use thiserror::Error;

/// Error type for the Study Assist core crate.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Payload did not match any known stream event shape
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
