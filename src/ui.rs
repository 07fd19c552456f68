//! Outbound events for the UI/transport layer.
//!
//! Events are broadcast as [`UiEnvelope`]s tagged with the session they
//! belong to; transports subscribe and route by `session_id`. Emitting never
//! blocks and never fails the pipeline: with no subscribers, events are
//! simply dropped.

use crate::native::VoiceInfo;
use crate::turn::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UiEvent {
    /// What the user said this turn.
    UserMessage {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// The assistant's reply.
    AiResponse {
        text: String,
        bubbles: Vec<String>,
        artifact: Option<serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    /// A new conversation was opened for this session.
    ConversationCreated {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },
    /// Input capture started or stopped.
    ListeningChanged { listening: bool },
    /// Voices reported by the engine.
    Voices { voices: Vec<VoiceInfo> },
    /// Something went wrong in this session.
    Error { message: String },
}

impl UiEvent {
    #[must_use]
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::UserMessage {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// A [`UiEvent`] addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEnvelope {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: UiEvent,
}

/// Broadcast sink shared by every session.
#[derive(Debug, Clone)]
pub struct UiSink {
    tx: broadcast::Sender<UiEnvelope>,
}

impl UiSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit(&self, session_id: &SessionId, event: UiEvent) {
        let envelope = UiEnvelope {
            session_id: session_id.clone(),
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!(session = %session_id, "no UI subscribers; event dropped");
        }
    }
}

impl Default for UiSink {
    fn default() -> Self {
        Self::new(256)
    }
}
