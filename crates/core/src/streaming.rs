//! Stream Chunk Types and Session Accumulation
//!
//! Wire types for the two parallel token channels of a streaming session
//! (primary content and the secondary thinking/reasoning trace), the topic
//! naming contract shared with the backend, and the pure per-session state
//! machine that folds incoming chunks into accumulated text.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Suffix appended to a session's event name to form its reasoning topic.
pub const REASONING_TOPIC_SUFFIX: &str = "_reasoning";

/// Topic on which the backend emits thinking chunks for `event_name`.
pub fn reasoning_topic(event_name: &str) -> String {
    format!("{}{}", event_name, REASONING_TOPIC_SUFFIX)
}

/// One of the two parallel token channels of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChannel {
    /// Primary answer text
    Content,
    /// Chain-of-thought / reasoning trace
    Thinking,
}

impl StreamChannel {
    /// Topic name for this channel given the session's base event name.
    pub fn topic(&self, event_name: &str) -> String {
        match self {
            StreamChannel::Content => event_name.to_string(),
            StreamChannel::Thinking => reasoning_topic(event_name),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamChannel::Content => "content",
            StreamChannel::Thinking => "thinking",
        }
    }
}

impl std::fmt::Display for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single incremental delivery on a channel.
///
/// A chunk with `is_complete = true` may still carry text; it is appended
/// before the channel is treated as closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl StreamChunk {
    /// A partial chunk carrying text.
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_complete: false,
            chunk_id: None,
        }
    }

    /// An empty completion marker.
    pub fn complete() -> Self {
        Self {
            content: String::new(),
            is_complete: true,
            chunk_id: None,
        }
    }

    /// A completion marker that also carries final text.
    pub fn final_chunk(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_complete: true,
            chunk_id: None,
        }
    }

    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }
}

/// Decoded payload of one event on a channel topic.
///
/// Backend payloads are loosely shaped JSON objects; they are decoded into
/// this enum at the transport edge so that accumulation logic only ever sees
/// well-formed variants. An object carrying an `error` field is a transport
/// error for that channel, anything else must be a [`StreamChunk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelEvent {
    /// Backend reported a failure on this channel
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Incremental text and/or completion marker
    Chunk(StreamChunk),
}

impl ChannelEvent {
    /// Decode a raw JSON payload string.
    pub fn decode(payload: &str) -> CoreResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| CoreError::parse(format!("malformed stream payload: {}", e)))
    }

    /// Build an error event with an optional code.
    pub fn error(message: impl Into<String>, code: Option<String>) -> Self {
        ChannelEvent::Error {
            error: message.into(),
            code,
        }
    }
}

/// Result of applying one chunk to a [`SessionAccumulator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// This chunk transitioned its channel from open to closed
    pub closed: bool,
    /// Text appended by this chunk (empty if the channel was already closed)
    pub appended: String,
}

/// Per-session accumulation state for the content and thinking channels.
///
/// Each channel is append-only while open and closes exactly once. Chunks
/// arriving on a closed channel are ignored rather than rejected, since
/// push transports may redeliver completion markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAccumulator {
    content: String,
    thinking: String,
    content_open: bool,
    thinking_open: bool,
    chain_of_thought: bool,
}

impl SessionAccumulator {
    /// Create an accumulator. Without chain-of-thought the thinking channel
    /// starts closed, so finalization depends on the content channel alone.
    pub fn new(chain_of_thought: bool) -> Self {
        Self {
            content: String::new(),
            thinking: String::new(),
            content_open: true,
            thinking_open: chain_of_thought,
            chain_of_thought,
        }
    }

    /// Fold a chunk into the given channel.
    pub fn apply_chunk(&mut self, channel: StreamChannel, chunk: &StreamChunk) -> ChunkOutcome {
        let (buffer, open) = match channel {
            StreamChannel::Content => (&mut self.content, &mut self.content_open),
            StreamChannel::Thinking => (&mut self.thinking, &mut self.thinking_open),
        };

        if !*open {
            return ChunkOutcome::default();
        }

        buffer.push_str(&chunk.content);
        if chunk.is_complete {
            *open = false;
        }

        ChunkOutcome {
            closed: chunk.is_complete,
            appended: chunk.content.clone(),
        }
    }

    /// Force both channels closed (error or cancellation).
    pub fn close_all(&mut self) {
        self.content_open = false;
        self.thinking_open = false;
    }

    /// Both channels have closed.
    pub fn is_finalized(&self) -> bool {
        !self.content_open && !self.thinking_open
    }

    pub fn is_channel_open(&self, channel: StreamChannel) -> bool {
        match channel {
            StreamChannel::Content => self.content_open,
            StreamChannel::Thinking => self.thinking_open,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Accumulated thinking text, `None` when chain-of-thought is disabled.
    pub fn thinking(&self) -> Option<&str> {
        self.chain_of_thought.then_some(self.thinking.as_str())
    }

    pub fn chain_of_thought(&self) -> bool {
        self.chain_of_thought
    }
}
