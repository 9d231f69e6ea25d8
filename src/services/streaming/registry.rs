//! Stream Session Registry
//!
//! Central authority over in-flight streaming sessions. A session listens on
//! its content topic and, with chain-of-thought enabled, on the matching
//! reasoning topic; chunks are folded into a [`SessionAccumulator`] and the
//! consumer's callbacks are invoked with cumulative state.
//!
//! Lifecycle rules:
//! - At most one live session per id. Starting an id that is already live
//!   tears the old session down first.
//! - Finalization (both channels closed) fires `on_complete` once, then the
//!   session is torn down after the configured grace period.
//! - Errors fire `on_error` once and tear down immediately.
//! - Every session carries a generation number captured by its listeners.
//!   Events whose generation no longer matches the live entry are dropped.
//!
//! User callbacks are never invoked while the session map is locked.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use study_assist_core::{ChannelEvent, SessionAccumulator, StreamChannel, StreamChunk};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event_source::{subscribe_channel, EventSource, Subscription};
use super::options::StreamOptions;
use crate::models::settings::StreamingConfig;
use crate::models::streaming::{StreamProgress, StreamSnapshot};
use crate::utils::error::{AppError, AppResult};

struct SessionEntry {
    generation: u64,
    event_name: String,
    accumulator: SessionAccumulator,
    is_streaming: bool,
    error: Option<String>,
    completed: bool,
    started_at: DateTime<Utc>,
    content_subscription: Option<Subscription>,
    thinking_subscription: Option<Subscription>,
    options: Arc<StreamOptions>,
    runtime: Option<Handle>,
}

impl SessionEntry {
    fn subscription_slot(&mut self, channel: StreamChannel) -> &mut Option<Subscription> {
        match channel {
            StreamChannel::Content => &mut self.content_subscription,
            StreamChannel::Thinking => &mut self.thinking_subscription,
        }
    }

    fn snapshot(&self, session_id: &str) -> StreamSnapshot {
        StreamSnapshot {
            session_id: session_id.to_string(),
            event_name: self.event_name.clone(),
            content: self.accumulator.content().to_string(),
            thinking: self.accumulator.thinking().map(str::to_string),
            is_streaming: self.is_streaming,
            error: self.error.clone(),
            content_channel_open: self.accumulator.is_channel_open(StreamChannel::Content),
            thinking_channel_open: self.accumulator.is_channel_open(StreamChannel::Thinking),
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// Work left to do after a chunk was applied under the lock
struct ChunkAction {
    options: Arc<StreamOptions>,
    progress: Option<StreamProgress>,
    detached: Option<Subscription>,
    finalized: Option<(String, Option<String>)>,
    runtime: Option<Handle>,
}

struct RegistryInner {
    source: Arc<dyn EventSource>,
    grace_period: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    next_generation: AtomicU64,
}

impl RegistryInner {
    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_channel_event(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        channel: StreamChannel,
        event: ChannelEvent,
    ) {
        match event {
            ChannelEvent::Error { error, code } => {
                let message = match code {
                    Some(code) => format!("{} ({})", error, code),
                    None => error,
                };
                self.handle_error(session_id, generation, message);
            }
            ChannelEvent::Chunk(chunk) => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    self.apply_chunk(session_id, generation, channel, &chunk)
                }));
                if let Err(panic) = result {
                    self.handle_error(
                        session_id,
                        generation,
                        format!("{} chunk handler panicked: {}", channel, panic_message(&panic)),
                    );
                }
            }
        }
    }

    fn apply_chunk(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        channel: StreamChannel,
        chunk: &StreamChunk,
    ) {
        let action = {
            let mut sessions = self.lock_sessions();
            let entry = match sessions.get_mut(session_id) {
                Some(entry) if entry.generation == generation && entry.is_streaming => entry,
                _ => {
                    debug!(
                        "[StreamRegistry] Dropping late {} chunk for session {}",
                        channel, session_id
                    );
                    return;
                }
            };

            let outcome = entry.accumulator.apply_chunk(channel, chunk);

            let progress = (!outcome.appended.is_empty()).then(|| StreamProgress {
                session_id: session_id.to_string(),
                channel,
                delta: outcome.appended.clone(),
                content: entry.accumulator.content().to_string(),
                thinking: entry.accumulator.thinking().map(str::to_string),
                chunk_id: chunk.chunk_id.clone(),
            });

            let detached = if outcome.closed {
                entry.subscription_slot(channel).take()
            } else {
                None
            };

            let finalizes =
                outcome.closed && entry.accumulator.is_finalized() && !entry.completed;
            let finalized = if finalizes {
                entry.completed = true;
                entry.is_streaming = false;
                Some((
                    entry.accumulator.content().to_string(),
                    entry.accumulator.thinking().map(str::to_string),
                ))
            } else {
                None
            };

            ChunkAction {
                options: entry.options.clone(),
                progress,
                detached,
                finalized,
                runtime: entry.runtime.clone(),
            }
        };

        if let Some(subscription) = action.detached {
            debug!(
                "[StreamRegistry] {} channel closed for session {}",
                channel, session_id
            );
            if let Err(e) = subscription.unsubscribe() {
                warn!(
                    "[StreamRegistry] Failed to detach {} listener for session {}: {}",
                    channel, session_id, e
                );
            }
        }

        if let Some(progress) = &action.progress {
            let options = &action.options;
            let notify = || {
                let text_callback = match channel {
                    StreamChannel::Content => (&options.on_chunk, progress.content.as_str()),
                    StreamChannel::Thinking => (
                        &options.on_thinking,
                        progress.thinking.as_deref().unwrap_or_default(),
                    ),
                };
                if let (Some(callback), text) = text_callback {
                    callback(text);
                }
                if let Some(on_progress) = &options.on_progress {
                    on_progress(progress);
                }
            };
            // The finalizing chunk has already completed the session and must
            // reach teardown; earlier chunks let panics fall to the error path.
            if action.finalized.is_some() {
                guarded(session_id, "progress", notify);
            } else {
                notify();
            }
        }

        if let Some((content, thinking)) = action.finalized {
            info!(
                "[StreamRegistry] Session {} completed ({} content chars)",
                session_id,
                content.len()
            );
            if let Some(on_complete) = &action.options.on_complete {
                guarded(session_id, "on_complete", || {
                    on_complete(&content, thinking.as_deref())
                });
            }
            self.schedule_teardown(session_id, generation, action.runtime);
        }
    }

    /// Single error path: mark, notify once, tear down without grace delay.
    fn handle_error(self: &Arc<Self>, session_id: &str, generation: u64, message: String) {
        let mut entry = {
            let mut sessions = self.lock_sessions();
            match sessions.get(session_id) {
                Some(entry)
                    if entry.generation == generation
                        && entry.error.is_none()
                        && !entry.completed => {}
                _ => {
                    debug!(
                        "[StreamRegistry] Ignoring error for inactive or completed session {}: {}",
                        session_id, message
                    );
                    return;
                }
            }
            match sessions.remove(session_id) {
                Some(entry) => entry,
                None => return,
            }
        };

        entry.error = Some(message.clone());
        entry.is_streaming = false;
        entry.accumulator.close_all();
        warn!("[StreamRegistry] Session {} failed: {}", session_id, message);

        if let Some(on_error) = entry.options.on_error.clone() {
            guarded(session_id, "on_error", || on_error(&message));
        }
        self.teardown(session_id, entry);
    }

    /// Detach whatever listeners remain and notify removal.
    /// Detach failures are logged, never propagated.
    fn teardown(&self, session_id: &str, mut entry: SessionEntry) {
        for channel in [StreamChannel::Content, StreamChannel::Thinking] {
            if let Some(subscription) = entry.subscription_slot(channel).take() {
                if let Err(e) = subscription.unsubscribe() {
                    warn!(
                        "[StreamRegistry] Failed to detach {} listener for session {}: {}",
                        channel, session_id, e
                    );
                }
            }
        }
        debug!("[StreamRegistry] Session {} removed", session_id);

        if let Some(on_removed) = entry.options.on_removed.clone() {
            guarded(session_id, "on_removed", || on_removed(session_id));
        }
    }

    /// Remove the session only if it is still the given generation.
    fn stop_generation(&self, session_id: &str, generation: u64) {
        let entry = {
            let mut sessions = self.lock_sessions();
            match sessions.get(session_id) {
                Some(entry) if entry.generation == generation => sessions.remove(session_id),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            self.teardown(session_id, entry);
        }
    }

    fn schedule_teardown(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        runtime: Option<Handle>,
    ) {
        let handle = match runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => {
                warn!(
                    "[StreamRegistry] No async runtime for delayed teardown of {}, removing now",
                    session_id
                );
                self.stop_generation(session_id, generation);
                return;
            }
        };

        let weak = Arc::downgrade(self);
        let grace_period = self.grace_period;
        let session_id = session_id.to_string();
        handle.spawn(async move {
            tokio::time::sleep(grace_period).await;
            if let Some(inner) = weak.upgrade() {
                inner.stop_generation(&session_id, generation);
            }
        });
    }

    /// Store a freshly registered listener, or detach it at once when the
    /// session it was registered for is gone or that channel already closed.
    fn attach(
        &self,
        session_id: &str,
        generation: u64,
        channel: StreamChannel,
        subscription: Subscription,
    ) -> bool {
        let rejected = {
            let mut sessions = self.lock_sessions();
            match sessions.get_mut(session_id) {
                Some(entry) if entry.generation == generation => {
                    if entry.is_streaming && entry.accumulator.is_channel_open(channel) {
                        *entry.subscription_slot(channel) = Some(subscription);
                        return true;
                    }
                    Some(subscription)
                }
                _ => Some(subscription),
            }
        };

        if let Some(subscription) = rejected {
            debug!(
                "[StreamRegistry] Session {} ended during {} registration, detaching",
                session_id, channel
            );
            if let Err(e) = subscription.unsubscribe() {
                warn!(
                    "[StreamRegistry] Failed to detach {} listener for session {}: {}",
                    channel, session_id, e
                );
            }
        }
        false
    }
}

/// Registry of active streaming sessions.
///
/// Cheap to clone; clones share the same session map. Construct one per
/// owning scope rather than sharing a process-wide instance.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

impl StreamRegistry {
    pub fn new(source: Arc<dyn EventSource>, config: &StreamingConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                grace_period: config.grace_period(),
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Generate a unique session id
    pub fn generate_session_id() -> String {
        format!("stream-{}", Uuid::new_v4())
    }

    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }

    /// Start listening for a session's chunks.
    ///
    /// Resolves once every channel listener is registered; the caller should
    /// trigger the backend only afterwards. A registration failure runs the
    /// error path, leaves no session behind, and is returned as `Err`.
    pub async fn start_stream(
        &self,
        session_id: &str,
        event_name: &str,
        options: StreamOptions,
    ) -> AppResult<()> {
        validate_start(session_id, event_name)?;

        let chain_of_thought = options.enable_chain_of_thought;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let entry = SessionEntry {
            generation,
            event_name: event_name.to_string(),
            accumulator: SessionAccumulator::new(chain_of_thought),
            is_streaming: true,
            error: None,
            completed: false,
            started_at: Utc::now(),
            content_subscription: None,
            thinking_subscription: None,
            options: Arc::new(options),
            runtime: Handle::try_current().ok(),
        };

        let previous = self
            .inner
            .lock_sessions()
            .insert(session_id.to_string(), entry);
        if let Some(previous) = previous {
            info!("[StreamRegistry] Replacing active session {}", session_id);
            self.inner.teardown(session_id, previous);
        }
        debug!(
            "[StreamRegistry] Starting session {} on {} (chain_of_thought={})",
            session_id, event_name, chain_of_thought
        );

        let mut channels = vec![StreamChannel::Content];
        if chain_of_thought {
            channels.push(StreamChannel::Thinking);
        }

        for channel in channels {
            let subscription = match self
                .subscribe(session_id, generation, event_name, channel)
                .await
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    self.inner.handle_error(
                        session_id,
                        generation,
                        format!("failed to listen on {}: {}", channel.topic(event_name), e),
                    );
                    return Err(e);
                }
            };
            if !self.inner.attach(session_id, generation, channel, subscription) {
                break;
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        session_id: &str,
        generation: u64,
        event_name: &str,
        channel: StreamChannel,
    ) -> AppResult<Subscription> {
        let weak = Arc::downgrade(&self.inner);
        let owner = session_id.to_string();
        let topic = channel.topic(event_name);

        subscribe_channel(&*self.inner.source, &topic, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_channel_event(&owner, generation, channel, event);
            }
        })
        .await
    }

    /// Detach both listeners and forget the session. No-op for unknown ids.
    pub fn stop_stream(&self, session_id: &str) {
        let entry = self.inner.lock_sessions().remove(session_id);
        if let Some(entry) = entry {
            info!("[StreamRegistry] Stopping session {}", session_id);
            self.inner.teardown(session_id, entry);
        }
    }

    /// Stop every active session. Individual detach failures are logged and
    /// do not prevent the rest from being cleaned up.
    pub fn stop_all_streams(&self) {
        let drained: Vec<(String, SessionEntry)> = self.inner.lock_sessions().drain().collect();
        if !drained.is_empty() {
            info!("[StreamRegistry] Stopping {} active sessions", drained.len());
        }
        for (session_id, entry) in drained {
            self.inner.teardown(&session_id, entry);
        }
    }

    pub fn get_stream_state(&self, session_id: &str) -> Option<StreamSnapshot> {
        self.inner
            .lock_sessions()
            .get(session_id)
            .map(|entry| entry.snapshot(session_id))
    }

    pub fn is_stream_active(&self, session_id: &str) -> bool {
        self.inner.lock_sessions().contains_key(session_id)
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock_sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock_sessions().len()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("source", &self.inner.source.name())
            .field("grace_period", &self.inner.grace_period)
            .field("active", &self.active_count())
            .finish()
    }
}

/// Reject blank session ids and event names before any state is created.
pub(crate) fn validate_start(session_id: &str, event_name: &str) -> AppResult<()> {
    if session_id.trim().is_empty() {
        return Err(AppError::validation("session id must not be empty"));
    }
    if event_name.trim().is_empty() {
        return Err(AppError::validation("event name must not be empty"));
    }
    Ok(())
}

/// Run a consumer callback, containing any panic.
fn guarded(session_id: &str, label: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            "[StreamRegistry] {} callback for session {} panicked: {}",
            label,
            session_id,
            panic_message(&panic)
        );
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
