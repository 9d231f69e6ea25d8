//! Study Assist Core
//!
//! Foundational types for the Study Assist Desktop workspace. This crate has
//! zero dependencies on application-level code (Tauri, async runtime, event
//! transports).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `streaming` - Stream chunk wire types, channel naming, payload decoding
//!   and the per-session accumulator

pub mod error;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{
    reasoning_topic, ChannelEvent, ChunkOutcome, SessionAccumulator, StreamChannel, StreamChunk,
    REASONING_TOPIC_SUFFIX,
};
