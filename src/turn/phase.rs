//! Turn phase state machine.
//!
//! ```text
//!            transcript          stage 1            response cached       speak
//!   Idle ───────────────► Arming ───────► Generating ───────────────► AwaitingPlayback ─────► Speaking
//!    ▲                    │  ▲ transcript                                                      │
//!    │                    └──┘ (restart cascade)                                               │
//!    └──────────────────── reset (interruption, speech ended, timeout, empty reply, stop) ◄────┘
//! ```
//!
//! Every phase may reset to `Idle`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No utterance in progress and nothing in flight.
    #[default]
    Idle,
    /// The user is talking; the silence cascade is pending.
    Arming,
    /// Stage 1 fired; the generator call is in flight.
    Generating,
    /// A response is cached and waiting for stage 3.
    AwaitingPlayback,
    /// The engine is speaking the response.
    Speaking,
}

impl TurnPhase {
    /// Whether the response pipeline is engaged for the current turn.
    #[must_use]
    pub fn in_response_pipeline(self) -> bool {
        matches!(
            self,
            Self::Generating | Self::AwaitingPlayback | Self::Speaking
        )
    }

    /// Whether a generator call is in flight.
    #[must_use]
    pub fn processing_response(self) -> bool {
        self == Self::Generating
    }

    /// Whether the engine is speaking.
    #[must_use]
    pub fn tts_playing(self) -> bool {
        self == Self::Speaking
    }

    /// Returns `true` if a transition from `self` to `target` is valid.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::Idle)
                | (Self::Idle, Self::Arming)
                | (Self::Arming, Self::Arming)
                | (Self::Arming, Self::Generating)
                | (Self::Generating, Self::AwaitingPlayback)
                | (Self::AwaitingPlayback, Self::Speaking)
        )
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Generating => "generating",
            Self::AwaitingPlayback => "awaiting_playback",
            Self::Speaking => "speaking",
        };
        f.write_str(label)
    }
}
