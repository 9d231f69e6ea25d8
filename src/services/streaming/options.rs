//! Stream Options
//!
//! Per-session settings and consumer callbacks passed to `start_stream`.

use std::sync::Arc;

use crate::models::streaming::StreamProgress;

/// Receives cumulative text for one channel
pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Receives final content and, when chain-of-thought is enabled, final thinking
pub type CompleteCallback = Arc<dyn Fn(&str, Option<&str>) + Send + Sync>;
/// Receives a progress payload after every appended chunk
pub type ProgressCallback = Arc<dyn Fn(&StreamProgress) + Send + Sync>;

/// Options for a single streaming session.
///
/// ```ignore
/// let options = StreamOptions::new()
///     .with_chain_of_thought(true)
///     .on_complete(|content, thinking| println!("{content} / {thinking:?}"));
/// ```
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Also listen on `<event_name>_reasoning`
    pub enable_chain_of_thought: bool,
    pub(crate) on_chunk: Option<TextCallback>,
    pub(crate) on_thinking: Option<TextCallback>,
    pub(crate) on_complete: Option<CompleteCallback>,
    pub(crate) on_error: Option<TextCallback>,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_removed: Option<TextCallback>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain_of_thought(mut self, enabled: bool) -> Self {
        self.enable_chain_of_thought = enabled;
        self
    }

    /// Called with the cumulative content after each content chunk
    pub fn on_chunk(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Arc::new(f));
        self
    }

    /// Called with the cumulative thinking text after each reasoning chunk
    pub fn on_thinking(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_thinking = Some(Arc::new(f));
        self
    }

    /// Called exactly once when every channel of the session has closed
    pub fn on_complete(mut self, f: impl Fn(&str, Option<&str>) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Called at most once with the error message
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(&StreamProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Called once with the session id when the session leaves the active set
    pub fn on_removed(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_removed = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("enable_chain_of_thought", &self.enable_chain_of_thought)
            .field("on_chunk", &self.on_chunk.is_some())
            .field("on_thinking", &self.on_thinking.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .finish()
    }
}
