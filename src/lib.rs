//! Study Assist Desktop - Rust Backend Library
//!
//! Unified streaming session manager for backend LLM output. It includes:
//! - An event source abstraction over push-event transports
//! - A registry of streaming sessions accumulating content and thinking text
//! - A subscription facade projecting session state for UI consumers
//! - Tauri command handlers (feature `tauri-bridge`)

#[cfg(feature = "tauri-bridge")]
pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(feature = "tauri-bridge")]
pub use commands::streaming::{
    get_stream_state, is_stream_active, list_active_streams, manage_streaming, start_stream,
    stop_all_streams, stop_stream, streaming_builder, StreamingState,
};
pub use models::response::CommandResponse;
pub use models::settings::{StreamingConfig, StreamingConfigUpdate};
pub use models::streaming::{StreamPhase, StreamSnapshot, StreamUpdate, StreamView};
pub use services::streaming::{
    EventSource, InMemoryEventBus, StreamOptions, StreamRegistry, StreamSubscriptions,
    Subscription,
};
pub use state::AppState;
pub use study_assist_core::{StreamChannel, StreamChunk};
pub use utils::error::{AppError, AppResult};
