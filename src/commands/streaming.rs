//! Streaming Commands
//!
//! Tauri commands for driving streaming sessions from the webview. Session
//! updates are emitted through Tauri events, not through command return
//! values.
//!
//! Hosts either start from [`streaming_builder`] or call
//! [`manage_streaming`] from their own setup hook and register the commands
//! in their `generate_handler!` list.

use std::sync::Arc;

use tauri::{AppHandle, Builder, Manager, Runtime, State};

use crate::models::response::CommandResponse;
use crate::models::settings::StreamingConfig;
use crate::models::streaming::{StartStreamRequest, StreamView};
use crate::services::streaming::{
    StreamOptions, StreamRegistry, StreamSubscriptions, TauriEventSource, TauriUpdateEmitter,
};
use crate::state::AppState;

/// State for streaming commands
pub struct StreamingState {
    pub config: StreamingConfig,
    pub subscriptions: StreamSubscriptions,
}

impl StreamingState {
    /// Wire the Tauri event source and update emitter for `app_handle`
    pub fn new<R: Runtime>(app_handle: AppHandle<R>, config: StreamingConfig) -> Self {
        let source = Arc::new(TauriEventSource::new(app_handle.clone()));
        let subscriptions = AppState::new(source, config.clone()).new_scope();
        TauriUpdateEmitter::new(app_handle).attach(&subscriptions);
        Self {
            config,
            subscriptions,
        }
    }
}

/// Put a [`StreamingState`] under the app's managed state.
///
/// Returns false when one is already managed.
pub fn manage_streaming<R: Runtime>(app_handle: &AppHandle<R>, config: StreamingConfig) -> bool {
    app_handle.manage(StreamingState::new(app_handle.clone(), config))
}

/// Builder with streaming state managed at setup and all streaming commands
/// registered. Replaces any setup hook set on the builder earlier.
pub fn streaming_builder<R: Runtime>(config: StreamingConfig) -> Builder<R> {
    Builder::<R>::new()
        .setup(move |app| {
            manage_streaming(app.handle(), config);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            start_stream,
            stop_stream,
            stop_all_streams,
            is_stream_active,
            get_stream_state,
            list_active_streams,
        ])
}

/// Start listening for a backend stream
///
/// Returns the session id. The frontend triggers the backend command only
/// after this resolves so that no early chunk is lost.
#[tauri::command]
pub async fn start_stream(
    request: StartStreamRequest,
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<String>, String> {
    let session_id = request
        .session_id
        .unwrap_or_else(StreamRegistry::generate_session_id);
    let options = StreamOptions::new().with_chain_of_thought(request.enable_chain_of_thought);

    let result = state
        .subscriptions
        .start_stream(&session_id, &request.event_name, options)
        .await;
    Ok(result.map(|()| session_id).into())
}

/// Stop a session and detach its listeners
#[tauri::command]
pub async fn stop_stream(
    session_id: String,
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<bool>, String> {
    let was_active = state.subscriptions.is_stream_active(&session_id);
    state.subscriptions.stop_stream(&session_id);
    Ok(CommandResponse::ok(was_active))
}

/// Stop every session started from the webview
#[tauri::command]
pub async fn stop_all_streams(
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<bool>, String> {
    state.subscriptions.stop_all_streams();
    Ok(CommandResponse::ok(true))
}

#[tauri::command]
pub async fn is_stream_active(
    session_id: String,
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<bool>, String> {
    Ok(CommandResponse::ok(
        state.subscriptions.is_stream_active(&session_id),
    ))
}

/// Latest projection of a session, `None` once it has been removed
#[tauri::command]
pub async fn get_stream_state(
    session_id: String,
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<Option<StreamView>>, String> {
    Ok(CommandResponse::ok(
        state.subscriptions.get_stream_state(&session_id),
    ))
}

/// All tracked sessions
#[tauri::command]
pub async fn list_active_streams(
    state: State<'_, StreamingState>,
) -> Result<CommandResponse<Vec<StreamView>>, String> {
    Ok(CommandResponse::ok(state.subscriptions.snapshots()))
}
