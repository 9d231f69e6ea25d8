//! Subscription Facade Integration Tests
//!
//! Consumer-side projections and update publishing, including scope
//! teardown through `AppState::new_scope`.

use std::sync::Arc;
use std::time::Duration;

use study_assist_desktop::{
    AppState, InMemoryEventBus, StreamChunk, StreamOptions, StreamPhase, StreamUpdate,
    StreamingConfig,
};
use tokio_stream::StreamExt;

fn app_state(bus: &InMemoryEventBus, grace_period_ms: u64) -> AppState {
    let config = StreamingConfig {
        grace_period_ms,
        ..StreamingConfig::default()
    };
    AppState::new(Arc::new(bus.clone()), config)
}

#[tokio::test]
async fn test_update_stream_follows_session_lifecycle() {
    let bus = InMemoryEventBus::new();
    let state = app_state(&bus, 20);
    let subscriptions = state.new_scope();
    let mut updates = subscriptions.update_stream();

    subscriptions
        .start_stream(
            "s1",
            "chat_stream",
            StreamOptions::new().with_chain_of_thought(true),
        )
        .await
        .unwrap();
    bus.emit("chat_stream_reasoning", &StreamChunk::delta("think"))
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::final_chunk("Hi"))
        .unwrap();
    bus.emit("chat_stream_reasoning", &StreamChunk::complete())
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(Some(update)) =
        tokio::time::timeout(Duration::from_secs(2), updates.next()).await
    {
        let update = update.unwrap();
        let done = matches!(update, StreamUpdate::Removed { .. });
        seen.push(update);
        if done {
            break;
        }
    }

    assert_eq!(
        seen,
        vec![
            StreamUpdate::Started {
                session_id: "s1".to_string()
            },
            StreamUpdate::Progress {
                session_id: "s1".to_string(),
                channel: study_assist_desktop::StreamChannel::Thinking,
                content: String::new(),
                thinking: Some("think".to_string()),
            },
            StreamUpdate::Progress {
                session_id: "s1".to_string(),
                channel: study_assist_desktop::StreamChannel::Content,
                content: "Hi".to_string(),
                thinking: Some("think".to_string()),
            },
            StreamUpdate::Completed {
                session_id: "s1".to_string(),
                content: "Hi".to_string(),
                thinking: Some("think".to_string()),
            },
            StreamUpdate::Removed {
                session_id: "s1".to_string()
            },
        ]
    );
    assert!(subscriptions.get_stream_state("s1").is_none());
}

#[tokio::test]
async fn test_error_notifies_observers_and_removes_projection() {
    let bus = InMemoryEventBus::new();
    let state = app_state(&bus, 100);
    let subscriptions = state.new_scope();
    let errored = Arc::new(std::sync::Mutex::new(None));
    let sink = errored.clone();
    subscriptions.observe(move |update| {
        if let StreamUpdate::Errored { error, .. } = update {
            *sink.lock().unwrap() = Some(error.clone());
        }
    });

    subscriptions
        .start_stream("s3", "analysis_stream", StreamOptions::new())
        .await
        .unwrap();
    bus.emit_raw("analysis_stream", r#"{"error":"quota exceeded","code":"429"}"#);

    assert_eq!(
        errored.lock().unwrap().as_deref(),
        Some("quota exceeded (429)")
    );
    assert!(!subscriptions.is_stream_active("s3"));
    assert!(subscriptions.get_stream_state("s3").is_none());
    assert!(subscriptions.active_session_ids().is_empty());
}

#[tokio::test]
async fn test_projection_tracks_cumulative_content() {
    let bus = InMemoryEventBus::new();
    let state = app_state(&bus, 100);
    let subscriptions = state.new_scope();

    subscriptions
        .start_stream("s1", "chat_stream", StreamOptions::new())
        .await
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::delta("Hel")).unwrap();
    bus.emit("chat_stream", &StreamChunk::delta("lo")).unwrap();

    let view = subscriptions.get_stream_state("s1").unwrap();
    assert_eq!(view.content, "Hello");
    assert_eq!(view.thinking, None);
    assert!(view.is_streaming);
    assert_eq!(view.phase, StreamPhase::Streaming);
    assert_eq!(subscriptions.active_session_ids(), vec!["s1".to_string()]);

    bus.emit("chat_stream", &StreamChunk::complete()).unwrap();
    let view = subscriptions.get_stream_state("s1").unwrap();
    assert!(!view.is_streaming);
    assert_eq!(view.phase, StreamPhase::Completed);
    assert!(subscriptions.active_session_ids().is_empty());
}

#[tokio::test]
async fn test_dropping_scope_detaches_all_listeners() {
    let bus = InMemoryEventBus::new();
    let state = app_state(&bus, 100);

    {
        let subscriptions = state.new_scope();
        subscriptions
            .start_stream(
                "answer",
                "chat_stream",
                StreamOptions::new().with_chain_of_thought(true),
            )
            .await
            .unwrap();
        subscriptions
            .start_stream("summary", "summary_stream", StreamOptions::new())
            .await
            .unwrap();
        assert_eq!(bus.total_listeners(), 3);
    }

    assert_eq!(bus.total_listeners(), 0);
}

#[tokio::test]
async fn test_rejected_start_is_not_tracked() {
    let bus = InMemoryEventBus::new();
    let state = app_state(&bus, 100);
    let subscriptions = state.new_scope();

    let result = subscriptions
        .start_stream("", "chat_stream", StreamOptions::new())
        .await;

    assert!(result.is_err());
    assert!(subscriptions.snapshots().is_empty());
}
