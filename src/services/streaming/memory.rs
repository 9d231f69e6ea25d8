//! In-Memory Event Bus
//!
//! In-process [`EventSource`] used when no webview transport is present:
//! tests, the demo binary, and headless hosts. Emission invokes listeners
//! synchronously on the caller's thread, in registration order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::event_source::{EventSource, RawEventHandler, SourceEvent, Subscription};
use crate::utils::error::{AppError, AppResult};

type ListenerMap = HashMap<String, Vec<(u64, RawEventHandler)>>;

struct BusInner {
    listeners: Mutex<ListenerMap>,
    next_id: AtomicU64,
    available: AtomicBool,
}

impl BusInner {
    fn lock_listeners(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, topic: &str, id: u64) {
        let mut listeners = self.lock_listeners();
        if let Some(handlers) = listeners.get_mut(topic) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            if handlers.is_empty() {
                listeners.remove(topic);
            }
        }
    }
}

/// Topic-keyed publish/subscribe bus
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<BusInner>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Serialize `payload` to JSON and deliver it on `topic`.
    ///
    /// Returns the number of listeners that received the event.
    pub fn emit<T: Serialize>(&self, topic: &str, payload: &T) -> AppResult<usize> {
        let raw = serde_json::to_string(payload)?;
        Ok(self.dispatch(topic, SourceEvent::Payload(raw)))
    }

    /// Deliver a raw payload string verbatim
    pub fn emit_raw(&self, topic: &str, payload: impl Into<String>) -> usize {
        self.dispatch(topic, SourceEvent::Payload(payload.into()))
    }

    /// Report a transport fault to every listener on `topic`
    pub fn fault(&self, topic: &str, message: impl Into<String>) -> usize {
        self.dispatch(topic, SourceEvent::Fault(message.into()))
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .lock_listeners()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.inner.lock_listeners().values().map(Vec::len).sum()
    }

    /// While unavailable, `subscribe` fails with a transport error
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    fn dispatch(&self, topic: &str, event: SourceEvent) -> usize {
        // Handlers run without the lock held so they may subscribe or detach.
        let handlers: Vec<RawEventHandler> = self
            .inner
            .lock_listeners()
            .get(topic)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("listeners", &self.total_listeners())
            .field("available", &self.inner.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl EventSource for InMemoryEventBus {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn subscribe(&self, topic: &str, handler: RawEventHandler) -> AppResult<Subscription> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(AppError::transport(format!(
                "event bus unavailable, cannot listen on {}",
                topic
            )));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock_listeners()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        debug!("[EventBus] Listener {} registered on {}", id, topic);

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let topic_name = topic.to_string();
        Ok(Subscription::new(topic, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&topic_name, id);
            }
            Ok(())
        }))
    }
}
