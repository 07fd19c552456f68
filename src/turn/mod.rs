//! Turn detection and interruption pipeline.
//!
//! A [`TurnEngine`] owns the state of one voice session and reacts to what
//! the speech engine reports:
//!
//! - transcription updates go through the barge-in detector, which either
//!   cancels the turn in flight or restarts the silence cascade;
//! - the cascade's stages generate a reply and play it back;
//! - `speech_ended` closes the turn.

mod coordinator;
mod detector;
pub mod phase;
pub mod session;
pub mod timers;

pub use phase::TurnPhase;
pub use session::{SessionId, SessionSnapshot, TurnEngineParts};
pub use timers::TimerSlot;

use crate::error::VoiceError;
use crate::native::TranscriptionUpdate;
use crate::ui::UiEvent;
use session::TurnContext;
use std::sync::Arc;

/// Cloneable handle to one session's turn pipeline.
#[derive(Clone)]
pub struct TurnEngine {
    ctx: Arc<TurnContext>,
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("id", &self.ctx.id)
            .field("conversation_id", &self.ctx.conversation_id)
            .finish()
    }
}

impl TurnEngine {
    #[must_use]
    pub fn new(parts: TurnEngineParts) -> Self {
        Self {
            ctx: Arc::new(TurnContext::new(parts)),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.ctx.id
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.ctx.conversation_id
    }

    /// Feed a transcription update into the barge-in detector.
    pub fn on_transcript(&self, update: &TranscriptionUpdate) {
        detector::on_transcript(&self.ctx, update);
    }

    /// Feed a `speech_ended` event.
    pub fn on_speech_ended(&self) {
        coordinator::on_speech_ended(&self.ctx);
    }

    /// Restart the silence cascade for the latest transcript.
    pub fn reset_silence_timer(&self) {
        timers::reset_silence_timer(&self.ctx);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.ctx.lock().snapshot()
    }

    pub(crate) fn set_listening(&self, listening: bool) {
        let changed = {
            let mut state = self.ctx.lock();
            let changed = state.listening != listening;
            state.listening = listening;
            changed
        };
        if changed {
            self.ctx
                .ui
                .emit(&self.ctx.id, UiEvent::ListeningChanged { listening });
        }
    }

    /// Drop the turn in flight and stop listening.
    pub(crate) fn shutdown(&self) {
        self.ctx.lock().reset_pipeline(true);
        self.set_listening(false);
    }

    /// The engine process went away; nothing more will be heard or spoken.
    pub(crate) fn engine_exited(&self, exit_code: Option<i32>) {
        let err = VoiceError::NativeProcessExit { exit_code };
        tracing::warn!(session = %self.ctx.id, error = %err, "session stopped listening");
        self.shutdown();
        self.ctx.ui.emit(&self.ctx.id, UiEvent::error(err.to_string()));
    }

    pub(crate) fn ui_emit(&self, event: UiEvent) {
        self.ctx.ui.emit(&self.ctx.id, event);
    }
}
