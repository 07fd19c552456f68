//! Barge-in detection.
//!
//! Every transcription update is either more of the current utterance or the
//! user talking over a turn that is already being answered. In the second
//! case everything in flight is thrown away before the new utterance starts
//! its own cascade.

use crate::native::{NativeCommand, TranscriptionUpdate};
use crate::turn::session::{SessionState, TurnContext};
use crate::turn::timers;
use std::sync::Arc;

/// Handle one transcription update.
pub(crate) fn on_transcript(ctx: &Arc<TurnContext>, update: &TranscriptionUpdate) {
    let text = update.text.trim();
    let mut state = ctx.lock();

    let was_active = state.is_active();
    if was_active && !text.is_empty() {
        interrupt(ctx, &mut state, text);
    }

    // Re-read after the interruption; `was_active` is stale now and reusing
    // it would leave the new utterance without a cascade.
    let is_active_now = state.is_active();
    if is_active_now || text.is_empty() {
        tracing::trace!(
            session = %ctx.id,
            phase = %state.phase,
            empty = text.is_empty(),
            "transcription update not armed"
        );
        return;
    }

    state.latest_transcript = text.to_owned();
    state.latest_audio_span = update.audio_span();
    tracing::trace!(
        session = %ctx.id,
        is_final = update.is_final,
        is_speaking = update.is_speaking,
        chars = text.len(),
        "transcription update"
    );
    timers::arm(ctx, &mut state);
}

/// Cancel the current turn: timers, cached reply, phase, and whatever the
/// engine is saying or has accumulated.
fn interrupt(ctx: &TurnContext, state: &mut SessionState, text: &str) {
    tracing::info!(
        session = %ctx.id,
        phase = %state.phase,
        turn = state.turn,
        pending_timers = state.timers.pending().len(),
        heard = %text,
        "barge-in; cancelling turn"
    );
    state.reset_pipeline(true);
    ctx.commands.send_or_log(&ctx.id, NativeCommand::StopSpeaking);
    ctx.commands.send_or_log(&ctx.id, NativeCommand::ResetRecognition);
}
