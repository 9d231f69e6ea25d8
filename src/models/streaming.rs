//! Streaming Models
//!
//! Snapshots, progress payloads and facade updates for streaming sessions.
//! All types serialize with snake_case fields so they can be forwarded to the
//! webview unchanged.

use serde::{Deserialize, Serialize};
use study_assist_core::StreamChannel;

/// Lifecycle of a session as seen by a consumer.
///
/// `Idle -> Streaming -> {Completed | Errored} -> Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    Idle,
    Streaming,
    Completed,
    Errored,
    Removed,
}

impl StreamPhase {
    /// Whether the session has stopped producing text
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamPhase::Completed | StreamPhase::Errored | StreamPhase::Removed
        )
    }
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamPhase::Idle => "idle",
            StreamPhase::Streaming => "streaming",
            StreamPhase::Completed => "completed",
            StreamPhase::Errored => "errored",
            StreamPhase::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Read-only copy of a live registry session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub session_id: String,
    pub event_name: String,
    pub content: String,
    /// Present only when chain-of-thought is enabled for the session
    pub thinking: Option<String>,
    pub is_streaming: bool,
    pub error: Option<String>,
    pub content_channel_open: bool,
    pub thinking_channel_open: bool,
    /// RFC 3339 creation timestamp
    pub started_at: String,
}

/// Cumulative state handed to `on_progress` after every appended chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamProgress {
    pub session_id: String,
    pub channel: StreamChannel,
    /// Text appended by the chunk that triggered this update
    pub delta: String,
    pub content: String,
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

/// Per-consumer projection maintained by the subscription facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamView {
    pub session_id: String,
    pub content: String,
    pub thinking: Option<String>,
    pub is_streaming: bool,
    pub error: Option<String>,
    pub phase: StreamPhase,
}

impl StreamView {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: String::new(),
            thinking: None,
            is_streaming: false,
            error: None,
            phase: StreamPhase::Idle,
        }
    }
}

/// Change notification published by the subscription facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamUpdate {
    Started {
        session_id: String,
    },
    Progress {
        session_id: String,
        channel: StreamChannel,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },
    Completed {
        session_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },
    Errored {
        session_id: String,
        error: String,
    },
    Removed {
        session_id: String,
    },
}

impl StreamUpdate {
    pub fn session_id(&self) -> &str {
        match self {
            StreamUpdate::Started { session_id }
            | StreamUpdate::Progress { session_id, .. }
            | StreamUpdate::Completed { session_id, .. }
            | StreamUpdate::Errored { session_id, .. }
            | StreamUpdate::Removed { session_id } => session_id,
        }
    }
}

/// IPC request to start listening for a backend stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartStreamRequest {
    /// Generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
    pub event_name: String,
    #[serde(default)]
    pub enable_chain_of_thought: bool,
}
