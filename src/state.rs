//! Application State
//!
//! Explicitly constructed state shared by commands: the event source and the
//! streaming configuration. Sessions live in per-consumer scopes.

use std::path::Path;
use std::sync::Arc;

use crate::models::settings::StreamingConfig;
use crate::services::streaming::{EventSource, StreamRegistry, StreamSubscriptions};
use crate::utils::error::AppResult;

/// Application state managed by the host
pub struct AppState {
    /// Push-event transport shared by every registry
    source: Arc<dyn EventSource>,
    /// Streaming configuration
    config: StreamingConfig,
}

impl AppState {
    /// Create state over the given event source
    pub fn new(source: Arc<dyn EventSource>, config: StreamingConfig) -> Self {
        Self { source, config }
    }

    /// Create state with configuration loaded from `path` (defaults if missing)
    pub fn from_config_file(source: Arc<dyn EventSource>, path: &Path) -> AppResult<Self> {
        let config = StreamingConfig::load_from(path)?;
        Ok(Self::new(source, config))
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// A consumer scope with its own registry on the shared event source.
    ///
    /// Dropping the scope stops only the streams it started.
    pub fn new_scope(&self) -> StreamSubscriptions {
        let registry = StreamRegistry::new(self.source.clone(), &self.config);
        StreamSubscriptions::new(registry, self.config.update_buffer)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish()
    }
}
