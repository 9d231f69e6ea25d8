//! Services
//!
//! Business logic for streaming sessions.

pub mod streaming;
