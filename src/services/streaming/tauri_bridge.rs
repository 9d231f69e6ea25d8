//! Tauri Event Bridge
//!
//! Connects the streaming services to Tauri's event system: an
//! [`EventSource`] backed by `Listener::listen`, and an emitter forwarding
//! facade updates to the webview on a namespaced channel.

use async_trait::async_trait;
use tauri::{AppHandle, Emitter, Listener, Runtime};
use tracing::warn;

use super::event_source::{EventSource, RawEventHandler, SourceEvent, Subscription};
use super::facade::{ObserverId, StreamSubscriptions};
use crate::models::streaming::StreamUpdate;
use crate::utils::error::{AppError, AppResult};

/// Event channel names emitted to the frontend
pub mod channels {
    /// Facade updates (started, progress, completed, errored, removed)
    pub const STREAM_UPDATE: &str = "streaming:update";
}

/// Tauri accepts only alphanumerics, `-`, `/`, `:` and `_` in event names.
pub fn is_valid_event_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '/' | ':' | '_'))
}

/// Event source listening on the app's event bus
pub struct TauriEventSource<R: Runtime> {
    app_handle: AppHandle<R>,
}

impl<R: Runtime> TauriEventSource<R> {
    pub fn new(app_handle: AppHandle<R>) -> Self {
        Self { app_handle }
    }
}

#[async_trait]
impl<R: Runtime> EventSource for TauriEventSource<R> {
    fn name(&self) -> &'static str {
        "tauri"
    }

    async fn subscribe(&self, topic: &str, handler: RawEventHandler) -> AppResult<Subscription> {
        if !is_valid_event_name(topic) {
            return Err(AppError::transport(format!(
                "invalid Tauri event name: {}",
                topic
            )));
        }

        // Registration is synchronous, so the listener is live on return.
        let event_id = self.app_handle.listen(topic, move |event| {
            handler(SourceEvent::Payload(event.payload().to_string()));
        });

        let app_handle = self.app_handle.clone();
        Ok(Subscription::new(topic, move || {
            app_handle.unlisten(event_id);
            Ok(())
        }))
    }
}

/// Forwards facade updates to the webview
pub struct TauriUpdateEmitter<R: Runtime> {
    app_handle: AppHandle<R>,
}

impl<R: Runtime> TauriUpdateEmitter<R> {
    pub fn new(app_handle: AppHandle<R>) -> Self {
        Self { app_handle }
    }

    pub fn emit_update(&self, update: &StreamUpdate) {
        if let Err(e) = self.app_handle.emit(channels::STREAM_UPDATE, update) {
            warn!(
                "[StreamEmitter] Failed to emit update for session {}: {}",
                update.session_id(),
                e
            );
        }
    }

    /// Register as an observer on `subscriptions`
    pub fn attach(self, subscriptions: &StreamSubscriptions) -> ObserverId {
        subscriptions.observe(move |update| self.emit_update(update))
    }
}
