//! Streaming Registry Integration Tests
//!
//! Lifecycle properties of the session registry: one live session per id,
//! two-channel finalization, late chunk handling, fault-tolerant shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use study_assist_desktop::services::streaming::{RawEventHandler, SourceEvent, StreamOptions};
use study_assist_desktop::{
    AppError, AppResult, EventSource, InMemoryEventBus, StreamChunk, StreamRegistry,
    StreamingConfig, Subscription,
};

type Completions = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn registry(bus: &InMemoryEventBus, grace_period_ms: u64) -> StreamRegistry {
    let config = StreamingConfig {
        grace_period_ms,
        ..StreamingConfig::default()
    };
    StreamRegistry::new(Arc::new(bus.clone()), &config)
}

fn recording_completion(options: StreamOptions) -> (StreamOptions, Completions) {
    let completions: Completions = Arc::new(Mutex::new(Vec::new()));
    let sink = completions.clone();
    let options = options.on_complete(move |content, thinking| {
        sink.lock()
            .unwrap()
            .push((content.to_string(), thinking.map(str::to_string)));
    });
    (options, completions)
}

fn recording_errors(options: StreamOptions) -> (StreamOptions, Arc<Mutex<Vec<String>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let options = options.on_error(move |error| sink.lock().unwrap().push(error.to_string()));
    (options, errors)
}

/// Delegates to an in-memory bus, but reports a failed detach for one topic.
struct FlakyDetachSource {
    bus: InMemoryEventBus,
    failing_topic: String,
}

#[async_trait]
impl EventSource for FlakyDetachSource {
    fn name(&self) -> &'static str {
        "flaky-detach"
    }

    async fn subscribe(&self, topic: &str, handler: RawEventHandler) -> AppResult<Subscription> {
        let inner = self.bus.subscribe(topic, handler).await?;
        if topic != self.failing_topic {
            return Ok(inner);
        }
        Ok(Subscription::new(topic, move || {
            inner.unsubscribe()?;
            Err(AppError::transport("listener already gone"))
        }))
    }
}

/// Keeps every handler after detach, modelling events already in flight
/// when a listener is removed.
#[derive(Default)]
struct RetainingSource {
    handlers: Mutex<Vec<(String, RawEventHandler)>>,
}

impl RetainingSource {
    /// Deliver to the `index`-th handler ever registered on `topic`.
    fn deliver(&self, topic: &str, index: usize, payload: &str) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .nth(index)
            .map(|(_, h)| h.clone())
            .expect("no handler at index");
        handler(SourceEvent::Payload(payload.to_string()));
    }
}

#[async_trait]
impl EventSource for RetainingSource {
    fn name(&self) -> &'static str {
        "retaining"
    }

    async fn subscribe(&self, topic: &str, handler: RawEventHandler) -> AppResult<Subscription> {
        self.handlers
            .lock()
            .unwrap()
            .push((topic.to_string(), handler));
        Ok(Subscription::new(topic, || Ok(())))
    }
}

fn event_log(options: StreamOptions) -> (StreamOptions, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (chunks, completes, errors) = (log.clone(), log.clone(), log.clone());
    let options = options
        .on_chunk(move |content| chunks.lock().unwrap().push(format!("chunk:{}", content)))
        .on_complete(move |content, _| {
            completes
                .lock()
                .unwrap()
                .push(format!("complete:{}", content))
        })
        .on_error(move |error| errors.lock().unwrap().push(format!("error:{}", error)));
    (options, log)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_chain_of_thought_session_completes_with_both_channels() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let (options, completions) =
        recording_completion(StreamOptions::new().with_chain_of_thought(true));

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();

    bus.emit("chat_stream", &StreamChunk::delta("Hel")).unwrap();
    bus.emit("chat_stream", &StreamChunk::delta("lo")).unwrap();
    bus.emit("chat_stream", &StreamChunk::complete()).unwrap();
    assert!(completions.lock().unwrap().is_empty());

    bus.emit("chat_stream_reasoning", &StreamChunk::delta("think1"))
        .unwrap();
    bus.emit("chat_stream_reasoning", &StreamChunk::complete())
        .unwrap();

    assert_eq!(
        *completions.lock().unwrap(),
        vec![("Hello".to_string(), Some("think1".to_string()))]
    );

    // Redelivered completion markers do not complete twice.
    bus.emit("chat_stream", &StreamChunk::complete()).unwrap();
    bus.emit("chat_stream_reasoning", &StreamChunk::complete())
        .unwrap();
    assert_eq!(completions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_channel_session_completes_on_content() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let (options, completions) = recording_completion(StreamOptions::new());

    registry
        .start_stream("s2", "chat_stream", options)
        .await
        .unwrap();
    assert_eq!(bus.listener_count("chat_stream_reasoning"), 0);

    bus.emit("chat_stream", &StreamChunk::final_chunk("Done"))
        .unwrap();

    assert_eq!(
        *completions.lock().unwrap(),
        vec![("Done".to_string(), None)]
    );
}

#[tokio::test]
async fn test_transport_error_removes_session_immediately() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 10_000);
    let (options, errors) = recording_errors(StreamOptions::new());
    let (options, completions) = recording_completion(options);

    registry
        .start_stream("s3", "analysis_stream", options)
        .await
        .unwrap();
    bus.emit("analysis_stream", &StreamChunk::delta("partial"))
        .unwrap();
    bus.fault("analysis_stream", "connection reset");

    assert_eq!(errors.lock().unwrap().len(), 1);
    assert!(errors.lock().unwrap()[0].contains("connection reset"));
    assert!(!registry.is_stream_active("s3"));
    assert!(registry.get_stream_state("s3").is_none());
    assert_eq!(bus.total_listeners(), 0);

    // Late chunk is dropped silently.
    bus.emit("analysis_stream", &StreamChunk::final_chunk("late"))
        .unwrap();
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert!(completions.lock().unwrap().is_empty());
}

// ============================================================================
// Lifecycle Properties
// ============================================================================

#[tokio::test]
async fn test_restart_keeps_one_live_session() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let (first, first_completions) = recording_completion(StreamOptions::new());
    let (second, second_completions) = recording_completion(StreamOptions::new());

    registry.start_stream("s1", "chat_stream", first).await.unwrap();
    registry
        .start_stream("s1", "chat_stream", second)
        .await
        .unwrap();

    assert_eq!(registry.active_count(), 1);
    assert_eq!(bus.listener_count("chat_stream"), 1);

    bus.emit("chat_stream", &StreamChunk::final_chunk("fresh"))
        .unwrap();
    assert!(first_completions.lock().unwrap().is_empty());
    assert_eq!(
        *second_completions.lock().unwrap(),
        vec![("fresh".to_string(), None)]
    );
}

#[tokio::test]
async fn test_content_completion_alone_does_not_finalize() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let (options, completions) =
        recording_completion(StreamOptions::new().with_chain_of_thought(true));

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::final_chunk("answer"))
        .unwrap();

    assert!(completions.lock().unwrap().is_empty());
    let snapshot = registry.get_stream_state("s1").unwrap();
    assert!(snapshot.is_streaming);
    assert!(!snapshot.content_channel_open);
    assert!(snapshot.thinking_channel_open);
    assert_eq!(bus.listener_count("chat_stream"), 0);
    assert_eq!(bus.listener_count("chat_stream_reasoning"), 1);
}

#[tokio::test]
async fn test_late_chunk_after_stop_is_ignored() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = chunks.clone();
    let options = StreamOptions::new().on_chunk(move |content| {
        sink.lock().unwrap().push(content.to_string());
    });
    let (options, completions) = recording_completion(options);

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::delta("Hel")).unwrap();
    registry.stop_stream("s1");

    assert_eq!(bus.emit("chat_stream", &StreamChunk::final_chunk("lo")).unwrap(), 0);
    assert_eq!(*chunks.lock().unwrap(), vec!["Hel".to_string()]);
    assert!(completions.lock().unwrap().is_empty());
    assert!(registry.get_stream_state("s1").is_none());
}

#[tokio::test]
async fn test_stop_all_streams_survives_detach_failure() {
    let bus = InMemoryEventBus::new();
    let source = FlakyDetachSource {
        bus: bus.clone(),
        failing_topic: "beta_stream".to_string(),
    };
    let registry = StreamRegistry::new(Arc::new(source), &StreamingConfig::default());

    for (id, topic) in [("a", "alpha_stream"), ("b", "beta_stream"), ("c", "gamma_stream")] {
        registry
            .start_stream(id, topic, StreamOptions::new().with_chain_of_thought(true))
            .await
            .unwrap();
    }
    assert_eq!(registry.active_count(), 3);
    assert_eq!(bus.total_listeners(), 6);

    registry.stop_all_streams();

    assert_eq!(registry.active_count(), 0);
    assert!(registry.active_session_ids().is_empty());
    assert_eq!(bus.total_listeners(), 0);
}

#[tokio::test]
async fn test_completed_session_is_removed_after_grace_period() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 30);
    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    let options =
        StreamOptions::new().on_removed(move |id| sink.lock().unwrap().push(id.to_string()));

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::final_chunk("Done"))
        .unwrap();

    let snapshot = registry.get_stream_state("s1").unwrap();
    assert!(!snapshot.is_streaming);
    assert_eq!(snapshot.content, "Done");
    assert!(removed.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!registry.is_stream_active("s1"));
    assert_eq!(*removed.lock().unwrap(), vec!["s1".to_string()]);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let bus = InMemoryEventBus::new();
    let handler: RawEventHandler = Arc::new(|_| {});
    let subscription = bus.subscribe("chat_stream", handler).await.unwrap();
    let other: RawEventHandler = Arc::new(|_| {});
    let _other = bus.subscribe("chat_stream", other).await.unwrap();

    subscription.unsubscribe().unwrap();
    subscription.unsubscribe().unwrap();

    assert!(!subscription.is_active());
    assert_eq!(bus.listener_count("chat_stream"), 1);
}

#[tokio::test]
async fn test_registration_failure_leaves_no_session() {
    let bus = InMemoryEventBus::new();
    bus.set_available(false);
    let registry = registry(&bus, 100);
    let (options, errors) = recording_errors(StreamOptions::new());

    let result = registry.start_stream("s1", "chat_stream", options).await;

    assert!(matches!(result, Err(AppError::Transport(_))));
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert!(!registry.is_stream_active("s1"));
}

#[tokio::test]
async fn test_concurrent_sessions_share_no_state() {
    let bus = InMemoryEventBus::new();
    let registry = registry(&bus, 100);
    let (answer, answer_done) =
        recording_completion(StreamOptions::new().with_chain_of_thought(true));
    let (summary, summary_done) = recording_completion(StreamOptions::new());

    registry
        .start_stream("answer", "chat_stream", answer)
        .await
        .unwrap();
    registry
        .start_stream("summary", "summary_stream", summary)
        .await
        .unwrap();
    assert_eq!(
        registry.active_session_ids(),
        vec!["answer".to_string(), "summary".to_string()]
    );

    bus.emit("summary_stream", &StreamChunk::delta("Short "))
        .unwrap();
    bus.emit("chat_stream", &StreamChunk::delta("Long "))
        .unwrap();
    bus.emit("summary_stream", &StreamChunk::final_chunk("form"))
        .unwrap();

    assert_eq!(
        *summary_done.lock().unwrap(),
        vec![("Short form".to_string(), None)]
    );
    assert!(answer_done.lock().unwrap().is_empty());
    assert_eq!(registry.get_stream_state("answer").unwrap().content, "Long ");
}

// ============================================================================
// In-flight Events
// ============================================================================

#[tokio::test]
async fn test_in_flight_chunk_after_stop_is_dropped() {
    let source = Arc::new(RetainingSource::default());
    let registry = StreamRegistry::new(source.clone(), &StreamingConfig::default());
    let (options, log) = event_log(StreamOptions::new());

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();
    source.deliver("chat_stream", 0, r#"{"content":"Hel","is_complete":false}"#);
    registry.stop_stream("s1");

    source.deliver("chat_stream", 0, r#"{"content":"lo","is_complete":true}"#);
    source.deliver("chat_stream", 0, r#"{"error":"late fault"}"#);

    assert_eq!(*log.lock().unwrap(), vec!["chunk:Hel".to_string()]);
    assert!(!registry.is_stream_active("s1"));
    assert!(registry.get_stream_state("s1").is_none());
}

#[tokio::test]
async fn test_in_flight_chunk_from_replaced_session_is_dropped() {
    let source = Arc::new(RetainingSource::default());
    let registry = StreamRegistry::new(source.clone(), &StreamingConfig::default());
    let (first, first_log) = event_log(StreamOptions::new());
    let (second, second_log) = event_log(StreamOptions::new());

    registry.start_stream("s1", "chat_stream", first).await.unwrap();
    registry
        .start_stream("s1", "chat_stream", second)
        .await
        .unwrap();

    // Handler 0 belongs to the replaced session.
    source.deliver("chat_stream", 0, r#"{"content":"stale","is_complete":true}"#);
    assert!(first_log.lock().unwrap().is_empty());
    assert!(second_log.lock().unwrap().is_empty());
    let snapshot = registry.get_stream_state("s1").unwrap();
    assert!(snapshot.is_streaming);
    assert_eq!(snapshot.content, "");

    source.deliver("chat_stream", 1, r#"{"content":"fresh","is_complete":true}"#);
    assert_eq!(
        *second_log.lock().unwrap(),
        vec!["chunk:fresh".to_string(), "complete:fresh".to_string()]
    );
}

#[tokio::test]
async fn test_error_after_completion_is_ignored() {
    let source = Arc::new(RetainingSource::default());
    let config = StreamingConfig {
        grace_period_ms: 10_000,
        ..StreamingConfig::default()
    };
    let registry = StreamRegistry::new(source.clone(), &config);
    let (options, log) = event_log(StreamOptions::new());

    registry
        .start_stream("s1", "chat_stream", options)
        .await
        .unwrap();
    source.deliver("chat_stream", 0, r#"{"content":"Done","is_complete":true}"#);
    source.deliver("chat_stream", 0, r#"{"error":"late fault"}"#);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["chunk:Done".to_string(), "complete:Done".to_string()]
    );
    // Still inside the grace period: the error did not tear it down.
    let snapshot = registry.get_stream_state("s1").unwrap();
    assert!(!snapshot.is_streaming);
    assert_eq!(snapshot.error, None);
}
