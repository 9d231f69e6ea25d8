//! Event Source Adapter
//!
//! Uniform subscribe/unsubscribe primitive over the host's push-event
//! transport. Sources deliver raw payload strings; [`subscribe_channel`]
//! decodes them into [`ChannelEvent`]s at the edge so malformed payloads
//! never reach session accumulation.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use study_assist_core::ChannelEvent;
use tracing::warn;

use crate::utils::error::AppResult;

/// One delivery from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Raw JSON payload, passed through verbatim
    Payload(String),
    /// The transport reported a fault on this topic
    Fault(String),
}

/// Per-event callback registered with an [`EventSource`]
pub type RawEventHandler = Arc<dyn Fn(SourceEvent) + Send + Sync>;

type DetachFn = Box<dyn FnOnce() -> AppResult<()> + Send>;

/// Push-event transport.
///
/// Implementations must resolve `subscribe` only after the listener is
/// registered, so no event emitted afterwards is missed. Events emitted
/// before resolution may be lost.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns the transport name for logging.
    fn name(&self) -> &'static str;

    /// Register `handler` for `topic`.
    async fn subscribe(&self, topic: &str, handler: RawEventHandler) -> AppResult<Subscription>;
}

/// Handle to a registered listener.
///
/// `unsubscribe` is idempotent: only the first call reaches the transport.
/// Dropping a still-attached subscription detaches it.
pub struct Subscription {
    topic: String,
    detach: Mutex<Option<DetachFn>>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        detach: impl FnOnce() -> AppResult<()> + Send + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the listener is still attached
    pub fn is_active(&self) -> bool {
        self.detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Detach the listener. Later calls are no-ops returning `Ok`.
    pub fn unsubscribe(&self) -> AppResult<()> {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match detach {
            Some(detach) => detach(),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(e) = self.unsubscribe() {
            warn!(
                "[EventSource] Failed to detach listener for {} on drop: {}",
                self.topic, e
            );
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Subscribe to `topic` and receive decoded channel events.
///
/// Payloads that fail to decode are logged and dropped. Transport faults are
/// surfaced as [`ChannelEvent::Error`].
pub async fn subscribe_channel<F>(
    source: &dyn EventSource,
    topic: &str,
    on_event: F,
) -> AppResult<Subscription>
where
    F: Fn(ChannelEvent) + Send + Sync + 'static,
{
    let topic_name = topic.to_string();
    let handler: RawEventHandler = Arc::new(move |event| match event {
        SourceEvent::Payload(raw) => match ChannelEvent::decode(&raw) {
            Ok(decoded) => on_event(decoded),
            Err(e) => warn!("[EventSource] Dropping payload on {}: {}", topic_name, e),
        },
        SourceEvent::Fault(message) => on_event(ChannelEvent::error(message, None)),
    });

    source.subscribe(topic, handler).await
}
