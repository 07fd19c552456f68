//! Silence timer cascade.
//!
//! Every non-empty transcription update restarts three staged timers. If the
//! user stays quiet long enough for a stage to fire, that stage runs:
//!
//! | slot       | default | action                                   |
//! |------------|---------|------------------------------------------|
//! | `llm`      | +0.5 s  | start generating a response              |
//! | `tts`      | +1.5 s  | reserved for speech pre-generation       |
//! | `playback` | +2.0 s  | wait for the response, show it, speak it |
//!
//! [`arm`] is the only place timers are armed.

use crate::turn::coordinator;
use crate::turn::phase::TurnPhase;
use crate::turn::session::{SessionState, TurnContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Llm,
    Tts,
    Playback,
}

impl TimerSlot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tts => "tts",
            Self::Playback => "playback",
        }
    }
}

/// Identifies the cascade arm and turn a stage was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StageTicket {
    pub(crate) arm_id: u64,
    pub(crate) turn: u64,
}

/// The three timer slots of a session. A slot holds a handle only while its
/// stage is scheduled and has not fired yet.
#[derive(Debug, Default)]
pub(crate) struct TimerSlots {
    arm_id: u64,
    llm: Option<JoinHandle<()>>,
    tts: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
}

impl TimerSlots {
    fn slot_mut(&mut self, slot: TimerSlot) -> &mut Option<JoinHandle<()>> {
        match slot {
            TimerSlot::Llm => &mut self.llm,
            TimerSlot::Tts => &mut self.tts,
            TimerSlot::Playback => &mut self.playback,
        }
    }

    /// Abort every scheduled stage. Returns how many were pending.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for handle in [self.llm.take(), self.tts.take(), self.playback.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
            cancelled += 1;
        }
        cancelled
    }

    pub(crate) fn pending(&self) -> Vec<TimerSlot> {
        [
            (TimerSlot::Llm, &self.llm),
            (TimerSlot::Tts, &self.tts),
            (TimerSlot::Playback, &self.playback),
        ]
        .into_iter()
        .filter_map(|(slot, handle)| handle.as_ref().map(|_| slot))
        .collect()
    }

    /// Empty `slot` for a firing stage. `false` if a newer arm superseded it.
    pub(crate) fn claim(&mut self, slot: TimerSlot, arm_id: u64) -> bool {
        if self.arm_id != arm_id {
            return false;
        }
        self.slot_mut(slot).take().is_some()
    }
}

/// Restart the cascade for the session's latest transcript.
pub(crate) fn reset_silence_timer(ctx: &Arc<TurnContext>) {
    let mut state = ctx.lock();
    arm(ctx, &mut state);
}

/// Cancel all three slots, then arm three fresh stages measured from now.
///
/// Callers hold the state lock so the check, the cancel and the re-arm are
/// one step. Refuses to arm while the response pipeline is engaged.
pub(crate) fn arm(ctx: &Arc<TurnContext>, state: &mut SessionState) {
    if state.phase.in_response_pipeline() {
        tracing::warn!(
            session = %ctx.id,
            phase = %state.phase,
            "not arming silence timers while the response pipeline is engaged"
        );
        return;
    }

    let cancelled = state.timers.cancel_all();
    if !state.transition(&ctx.id, TurnPhase::Arming) {
        return;
    }
    state.transcript_at_last_reset = state.latest_transcript.clone();

    let offsets = ctx
        .timing
        .offsets_for(&state.transcript_at_last_reset, state.latest_audio_span);
    state.timers.arm_id += 1;
    let ticket = StageTicket {
        arm_id: state.timers.arm_id,
        turn: state.turn,
    };

    state.timers.llm = Some(schedule(ctx, TimerSlot::Llm, offsets.llm, ticket));
    state.timers.tts = Some(schedule(ctx, TimerSlot::Tts, offsets.tts, ticket));
    state.timers.playback = Some(schedule(ctx, TimerSlot::Playback, offsets.playback, ticket));

    tracing::trace!(
        session = %ctx.id,
        arm_id = ticket.arm_id,
        cancelled,
        llm_ms = offsets.llm.as_millis() as u64,
        "silence timers armed"
    );
}

fn schedule(
    ctx: &Arc<TurnContext>,
    slot: TimerSlot,
    delay: Duration,
    ticket: StageTicket,
) -> JoinHandle<()> {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match slot {
            TimerSlot::Llm => coordinator::run_generation(&ctx, ticket).await,
            TimerSlot::Tts => run_tts_stage(&ctx, ticket),
            TimerSlot::Playback => coordinator::run_playback(&ctx, ticket).await,
        }
    })
}

/// Stage 2. Nothing to pre-generate yet; only keeps the slot bookkeeping honest.
fn run_tts_stage(ctx: &TurnContext, ticket: StageTicket) {
    let mut state = ctx.lock();
    if !state.enter_stage(TimerSlot::Tts, ticket) {
        return;
    }
    if !state.phase.in_response_pipeline() {
        tracing::debug!(session = %ctx.id, phase = %state.phase, "tts stage: pipeline cancelled");
        return;
    }
    tracing::trace!(session = %ctx.id, "tts stage: nothing to pre-generate");
}
