//! Utilities
//!
//! Error types and filesystem locations for streaming configuration.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
