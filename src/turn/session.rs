//! Per-session state shared by the pipeline stages.

use crate::config::{ResponsePipelineConfig, SessionSettings, TurnTimingConfig};
use crate::conversation::ConversationStore;
use crate::llm::{GeneratedResponse, ResponseGenerator};
use crate::native::CommandSender;
use crate::turn::phase::TurnPhase;
use crate::turn::timers::{StageTicket, TimerSlot, TimerSlots};
use crate::ui::UiSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Opaque session identifier, stable for the session lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Mutable state of one voice session.
///
/// Only ever touched under [`TurnContext::lock`], and the lock is never held
/// across an `.await`. Stages that suspend re-read everything on resume.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) listening: bool,
    pub(crate) latest_transcript: String,
    /// Recognized audio length of `latest_transcript`, if reported.
    pub(crate) latest_audio_span: Option<Duration>,
    /// Text at the last cascade arm; the utterance this turn answers.
    pub(crate) transcript_at_last_reset: String,
    pub(crate) timers: TimerSlots,
    /// Only `Some` while `phase == AwaitingPlayback`.
    pub(crate) cached_response: Option<GeneratedResponse>,
    pub(crate) phase: TurnPhase,
    /// Turn epoch; bumped by every pipeline reset.
    pub(crate) turn: u64,
}

impl SessionState {
    /// Move to `target`, refusing (and logging) transitions the table forbids.
    pub(crate) fn transition(&mut self, session: &SessionId, target: TurnPhase) -> bool {
        if !self.phase.can_transition_to(target) {
            tracing::warn!(
                session = %session,
                from = %self.phase,
                to = %target,
                "rejected turn phase transition"
            );
            return false;
        }
        tracing::debug!(session = %session, from = %self.phase, to = %target, turn = self.turn, "turn phase");
        self.phase = target;
        true
    }

    /// Whether a new utterance right now would be a barge-in.
    ///
    /// Only the phase decides. Timers pending in `Arming` belong to the
    /// utterance that is still growing, and every other phase with pending
    /// timers is already part of the response pipeline.
    pub(crate) fn is_active(&self) -> bool {
        self.phase.in_response_pipeline()
    }

    /// Drop everything belonging to the current turn and return to `Idle`.
    pub(crate) fn reset_pipeline(&mut self, clear_transcripts: bool) {
        self.timers.cancel_all();
        self.cached_response = None;
        self.phase = TurnPhase::Idle;
        self.turn += 1;
        if clear_transcripts {
            self.latest_transcript.clear();
            self.latest_audio_span = None;
            self.transcript_at_last_reset.clear();
        }
    }

    /// Entry check for a fired timer stage.
    ///
    /// Empties the stage's slot and returns `true` only if the ticket still
    /// belongs to the live cascade and turn.
    pub(crate) fn enter_stage(&mut self, slot: TimerSlot, ticket: StageTicket) -> bool {
        self.timers.claim(slot, ticket.arm_id) && self.turn == ticket.turn
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            listening: self.listening,
            latest_transcript: self.latest_transcript.clone(),
            transcript_at_last_reset: self.transcript_at_last_reset.clone(),
            pending_timers: self.timers.pending(),
            has_cached_response: self.cached_response.is_some(),
            turn: self.turn,
        }
    }
}

/// Point-in-time copy of a session's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: TurnPhase,
    pub listening: bool,
    pub latest_transcript: String,
    pub transcript_at_last_reset: String,
    pub pending_timers: Vec<TimerSlot>,
    pub has_cached_response: bool,
    pub turn: u64,
}

impl SessionSnapshot {
    #[must_use]
    pub fn in_response_pipeline(&self) -> bool {
        self.phase.in_response_pipeline()
    }

    #[must_use]
    pub fn tts_playing(&self) -> bool {
        self.phase.tts_playing()
    }

    #[must_use]
    pub fn processing_response(&self) -> bool {
        self.phase.processing_response()
    }
}

/// Everything a session's stages need: immutable settings, collaborators and
/// the locked mutable state.
pub(crate) struct TurnContext {
    pub(crate) id: SessionId,
    pub(crate) settings: SessionSettings,
    pub(crate) timing: TurnTimingConfig,
    pub(crate) pipeline: ResponsePipelineConfig,
    pub(crate) conversation_id: String,
    pub(crate) commands: CommandSender,
    pub(crate) generator: Arc<dyn ResponseGenerator>,
    pub(crate) conversation: Arc<dyn ConversationStore>,
    pub(crate) ui: UiSink,
    state: Mutex<SessionState>,
}

impl TurnContext {
    pub(crate) fn new(parts: TurnEngineParts) -> Self {
        Self {
            id: parts.id,
            settings: parts.settings,
            timing: parts.timing,
            pipeline: parts.pipeline,
            conversation_id: parts.conversation_id,
            commands: parts.commands,
            generator: parts.generator,
            conversation: parts.conversation,
            ui: parts.ui,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Inputs for [`TurnEngine::new`](crate::turn::TurnEngine::new).
pub struct TurnEngineParts {
    pub id: SessionId,
    pub settings: SessionSettings,
    pub timing: TurnTimingConfig,
    pub pipeline: ResponsePipelineConfig,
    pub conversation_id: String,
    pub commands: CommandSender,
    pub generator: Arc<dyn ResponseGenerator>,
    pub conversation: Arc<dyn ConversationStore>,
    pub ui: UiSink,
}
