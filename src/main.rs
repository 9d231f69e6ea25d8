// Study Assist Desktop - headless streaming demo
//
// Replays a scripted backend stream over the in-memory event bus and prints
// the facade updates. RUST_LOG controls log verbosity. Webview hosts wire the
// IPC commands with `commands::streaming::streaming_builder` instead.

use std::sync::Arc;
use std::time::Duration;

use study_assist_desktop::utils::paths::streaming_config_path;
use study_assist_desktop::{AppState, InMemoryEventBus, StreamChunk, StreamOptions, StreamUpdate};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bus = InMemoryEventBus::new();
    let source = Arc::new(bus.clone());
    let state = match streaming_config_path() {
        Ok(path) => AppState::from_config_file(source, &path)?,
        Err(e) => {
            warn!("[Demo] No config location, using defaults: {}", e);
            AppState::new(source, Default::default())
        }
    };
    let subscriptions = state.new_scope();
    let mut updates = subscriptions.updates();

    subscriptions
        .start_stream(
            "answer",
            "chat_stream",
            StreamOptions::new()
                .with_chain_of_thought(true)
                .on_complete(|content, thinking| {
                    info!(
                        "[Demo] answer complete: {:?} (thinking: {:?})",
                        content, thinking
                    );
                }),
        )
        .await?;
    subscriptions
        .start_stream(
            "summary",
            "summary_stream",
            StreamOptions::new().on_error(|error| warn!("[Demo] summary failed: {}", error)),
        )
        .await?;

    // Listeners are attached, so the backend may start emitting.
    bus.emit("chat_stream_reasoning", &StreamChunk::delta("Consider the question. "))?;
    bus.emit("chat_stream", &StreamChunk::delta("The answer "))?;
    bus.emit("chat_stream", &StreamChunk::final_chunk("is 42."))?;
    bus.emit("chat_stream_reasoning", &StreamChunk::complete())?;
    bus.emit("summary_stream", &StreamChunk::delta("Partial"))?;
    bus.emit_raw("summary_stream", r#"{"error":"backend disconnected"}"#);

    let mut removed = 0;
    while removed < 2 {
        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv()).await??;
        println!("{}", serde_json::to_string(&update)?);
        if matches!(update, StreamUpdate::Removed { .. }) {
            removed += 1;
        }
    }

    info!("[Demo] Done, {} listeners remaining", bus.total_listeners());
    Ok(())
}
