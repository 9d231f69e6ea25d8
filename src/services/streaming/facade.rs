//! Subscription Facade
//!
//! Consumer-facing wrapper around [`StreamRegistry`]. Keeps a per-consumer
//! projection of every tracked session and publishes [`StreamUpdate`]s so any
//! UI layer can follow along, either through callback observers or through a
//! broadcast channel.
//!
//! Dropping the facade stops every stream on its registry, so a UI scope
//! that goes away never leaves listeners behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::options::StreamOptions;
use super::registry::{validate_start, StreamRegistry};
use crate::models::streaming::{StreamPhase, StreamSnapshot, StreamUpdate, StreamView};
use crate::utils::error::AppResult;

/// Handle returned by [`StreamSubscriptions::observe`]
pub type ObserverId = u64;

type Observer = Arc<dyn Fn(&StreamUpdate) + Send + Sync>;

struct TrackedView {
    generation: u64,
    view: StreamView,
}

struct FacadeState {
    views: Mutex<HashMap<String, TrackedView>>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
    next_generation: AtomicU64,
    updates: broadcast::Sender<StreamUpdate>,
}

impl FacadeState {
    fn lock_views(&self) -> MutexGuard<'_, HashMap<String, TrackedView>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the projection for `session_id` if it still belongs to
    /// `generation`, then publish `update`.
    fn update_view(
        &self,
        session_id: &str,
        generation: u64,
        update: StreamUpdate,
        apply: impl FnOnce(&mut StreamView),
    ) {
        {
            let mut views = self.lock_views();
            match views.get_mut(session_id) {
                Some(tracked) if tracked.generation == generation => apply(&mut tracked.view),
                _ => return,
            }
        }
        self.publish(update);
    }

    fn remove_view(&self, session_id: &str, generation: u64) {
        let removed = {
            let mut views = self.lock_views();
            match views.get(session_id) {
                Some(tracked) if tracked.generation == generation => views.remove(session_id),
                _ => None,
            }
        };
        if removed.is_some() {
            self.publish(StreamUpdate::Removed {
                session_id: session_id.to_string(),
            });
        }
    }

    fn publish(&self, update: StreamUpdate) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&update);
        }
        // No receivers is fine: consumers may rely on observers only.
        let _ = self.updates.send(update);
    }
}

/// Reactive view over a [`StreamRegistry`] for one consumer scope
pub struct StreamSubscriptions {
    registry: StreamRegistry,
    state: Arc<FacadeState>,
}

impl StreamSubscriptions {
    pub fn new(registry: StreamRegistry, update_buffer: usize) -> Self {
        let (updates, _) = broadcast::channel(update_buffer.max(1));
        Self {
            registry,
            state: Arc::new(FacadeState {
                views: Mutex::new(HashMap::new()),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                updates,
            }),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Start a session and track its projection.
    ///
    /// The consumer's own callbacks in `options` still fire, after the
    /// projection has been updated.
    pub async fn start_stream(
        &self,
        session_id: &str,
        event_name: &str,
        options: StreamOptions,
    ) -> AppResult<()> {
        validate_start(session_id, event_name)?;

        let generation = self.state.next_generation.fetch_add(1, Ordering::SeqCst);
        let mut view = StreamView::new(session_id);
        view.phase = StreamPhase::Streaming;
        view.is_streaming = true;
        view.thinking = options.enable_chain_of_thought.then(String::new);

        self.state.lock_views().insert(
            session_id.to_string(),
            TrackedView { generation, view },
        );
        self.state.publish(StreamUpdate::Started {
            session_id: session_id.to_string(),
        });

        let wrapped = wrap_options(Arc::downgrade(&self.state), session_id, generation, options);
        let result = self
            .registry
            .start_stream(session_id, event_name, wrapped)
            .await;
        if result.is_err() {
            // Registration failures have usually removed the view through
            // on_removed already; this covers anything left behind.
            self.state.remove_view(session_id, generation);
        }
        result
    }

    pub fn stop_stream(&self, session_id: &str) {
        self.registry.stop_stream(session_id);
    }

    pub fn stop_all_streams(&self) {
        self.registry.stop_all_streams();
    }

    pub fn is_stream_active(&self, session_id: &str) -> bool {
        self.registry.is_stream_active(session_id)
    }

    /// Latest projection `{content, thinking, is_streaming, error}` of a session
    pub fn get_stream_state(&self, session_id: &str) -> Option<StreamView> {
        self.state
            .lock_views()
            .get(session_id)
            .map(|tracked| tracked.view.clone())
    }

    /// Raw registry snapshot, including channel state
    pub fn registry_snapshot(&self, session_id: &str) -> Option<StreamSnapshot> {
        self.registry.get_stream_state(session_id)
    }

    /// All tracked projections, ordered by session id
    pub fn snapshots(&self) -> Vec<StreamView> {
        let mut views: Vec<StreamView> = self
            .state
            .lock_views()
            .values()
            .map(|tracked| tracked.view.clone())
            .collect();
        views.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        views
    }

    /// Ids of tracked sessions that are still streaming
    pub fn active_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock_views()
            .iter()
            .filter(|(_, tracked)| tracked.view.phase == StreamPhase::Streaming)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Register a callback invoked for every update
    pub fn observe(&self, observer: impl Fn(&StreamUpdate) + Send + Sync + 'static) -> ObserverId {
        let id = self.state.next_observer.fetch_add(1, Ordering::SeqCst);
        self.state
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Returns false when `id` was not registered
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self
            .state
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Channel-based subscription to updates
    pub fn updates(&self) -> broadcast::Receiver<StreamUpdate> {
        self.state.updates.subscribe()
    }

    /// Updates as a `Stream`, for async consumers
    pub fn update_stream(&self) -> BroadcastStream<StreamUpdate> {
        BroadcastStream::new(self.updates())
    }
}

impl Drop for StreamSubscriptions {
    fn drop(&mut self) {
        debug!("[StreamSubscriptions] Scope dropped, stopping all streams");
        self.registry.stop_all_streams();
    }
}

impl std::fmt::Debug for StreamSubscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSubscriptions")
            .field("registry", &self.registry)
            .field("tracked", &self.state.lock_views().len())
            .finish()
    }
}

/// Route registry callbacks through the projection before the consumer's own.
fn wrap_options(
    state: Weak<FacadeState>,
    session_id: &str,
    generation: u64,
    options: StreamOptions,
) -> StreamOptions {
    let mut wrapped = StreamOptions::new().with_chain_of_thought(options.enable_chain_of_thought);
    wrapped.on_chunk = options.on_chunk.clone();
    wrapped.on_thinking = options.on_thinking.clone();

    {
        let state = state.clone();
        let user = options.on_progress.clone();
        wrapped = wrapped.on_progress(move |progress| {
            if let Some(state) = state.upgrade() {
                let update = StreamUpdate::Progress {
                    session_id: progress.session_id.clone(),
                    channel: progress.channel,
                    content: progress.content.clone(),
                    thinking: progress.thinking.clone(),
                };
                state.update_view(&progress.session_id, generation, update, |view| {
                    view.content = progress.content.clone();
                    view.thinking = progress.thinking.clone();
                });
            }
            if let Some(user) = &user {
                user(progress);
            }
        });
    }

    {
        let state = state.clone();
        let id = session_id.to_string();
        let user = options.on_complete.clone();
        wrapped = wrapped.on_complete(move |content, thinking| {
            if let Some(state) = state.upgrade() {
                let update = StreamUpdate::Completed {
                    session_id: id.clone(),
                    content: content.to_string(),
                    thinking: thinking.map(str::to_string),
                };
                state.update_view(&id, generation, update, |view| {
                    view.content = content.to_string();
                    view.thinking = thinking.map(str::to_string);
                    view.is_streaming = false;
                    view.phase = StreamPhase::Completed;
                });
            }
            if let Some(user) = &user {
                user(content, thinking);
            }
        });
    }

    {
        let state = state.clone();
        let id = session_id.to_string();
        let user = options.on_error.clone();
        wrapped = wrapped.on_error(move |error| {
            if let Some(state) = state.upgrade() {
                let update = StreamUpdate::Errored {
                    session_id: id.clone(),
                    error: error.to_string(),
                };
                state.update_view(&id, generation, update, |view| {
                    view.error = Some(error.to_string());
                    view.is_streaming = false;
                    view.phase = StreamPhase::Errored;
                });
            }
            if let Some(user) = &user {
                user(error);
            }
        });
    }

    let user = options.on_removed;
    wrapped.on_removed(move |removed_id| {
        if let Some(state) = state.upgrade() {
            state.remove_view(removed_id, generation);
        }
        if let Some(user) = &user {
            user(removed_id);
        }
    })
}
