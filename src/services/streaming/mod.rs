//! Unified Streaming Session Manager
//!
//! Multiplexes concurrent token streams pushed by the backend. Each session
//! listens on a content topic and optionally a `<topic>_reasoning` thinking
//! topic:
//! - `event_source` - transport abstraction, idempotent subscriptions, edge decoding
//! - `memory` - in-process event bus
//! - `registry` - session lifecycle (start, accumulate, finalize, error, stop)
//! - `facade` - per-consumer projections and update publishing
//! - `tauri_bridge` - Tauri event system integration (feature `tauri-bridge`)

pub mod event_source;
pub mod facade;
pub mod memory;
pub mod options;
pub mod registry;
#[cfg(feature = "tauri-bridge")]
pub mod tauri_bridge;

// Re-export main types
pub use event_source::{subscribe_channel, EventSource, RawEventHandler, SourceEvent, Subscription};
pub use facade::{ObserverId, StreamSubscriptions};
pub use memory::InMemoryEventBus;
pub use options::StreamOptions;
pub use registry::StreamRegistry;
#[cfg(feature = "tauri-bridge")]
pub use tauri_bridge::{TauriEventSource, TauriUpdateEmitter};
