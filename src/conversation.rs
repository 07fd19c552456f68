//! Append-only conversation log consulted before each generation.

use crate::error::{Result, VoiceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Who said a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of [`ConversationStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedConversation {
    pub id: String,
    pub title: String,
    /// `true` when the store had to create the conversation.
    pub created: bool,
}

/// Persistence for conversation history.
pub trait ConversationStore: Send + Sync + 'static {
    /// Continue `existing`, or create a new conversation when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `existing` names an unknown conversation.
    fn open(&self, existing: Option<&str>) -> Result<OpenedConversation>;

    /// All messages of a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation does not exist.
    fn history(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>>;

    /// Append a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation does not exist.
    fn append(&self, conversation_id: &str, message: ConversationMessage) -> Result<()>;
}

/// Process-local [`ConversationStore`].
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, Vec<ConversationMessage>>>,
}

impl InMemoryConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn open(&self, existing: Option<&str>) -> Result<OpenedConversation> {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        match existing {
            Some(id) if conversations.contains_key(id) => Ok(OpenedConversation {
                id: id.to_owned(),
                title: default_title(),
                created: false,
            }),
            Some(id) => Err(VoiceError::Session(format!("unknown conversation {id}"))),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conversations.insert(id.clone(), Vec::new());
                Ok(OpenedConversation {
                    id,
                    title: default_title(),
                    created: true,
                })
            }
        }
    }

    fn history(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>> {
        let conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| VoiceError::Session(format!("unknown conversation {conversation_id}")))
    }

    fn append(&self, conversation_id: &str, message: ConversationMessage) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        conversations
            .get_mut(conversation_id)
            .ok_or_else(|| VoiceError::Session(format!("unknown conversation {conversation_id}")))?
            .push(message);
        Ok(())
    }
}

fn default_title() -> String {
    format!("Voice conversation {}", Utc::now().format("%Y-%m-%d %H:%M"))
}
