//! Response generation seam.
//!
//! The turn pipeline treats generation as an opaque async call. It imposes
//! its own outer timeout, so implementations don't need one.

pub mod openai;

use crate::config::SessionSettings;
use crate::conversation::ConversationMessage;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiCompatibleGenerator;

/// A generated assistant reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Text to show and speak. May be empty.
    pub text: String,
    /// Short follow-up suggestions shown next to the reply.
    #[serde(default)]
    pub bubbles: Vec<String>,
    /// Optional structured payload for the UI to render.
    #[serde(default)]
    pub artifact: Option<serde_json::Value>,
}

impl GeneratedResponse {
    /// A reply with text only.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// `true` when there is nothing to say.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Produces assistant replies from conversation history.
#[async_trait]
pub trait ResponseGenerator: Send + Sync + 'static {
    /// Generate a reply. The last message in `history` is the user utterance
    /// being answered.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Generation`](crate::VoiceError::Generation) on
    /// any failure; the pipeline substitutes a fallback reply.
    async fn generate(
        &self,
        history: &[ConversationMessage],
        settings: &SessionSettings,
    ) -> Result<GeneratedResponse>;
}
