//! Response pipeline: generation (stage 1), playback (stage 3) and playback
//! completion.
//!
//! Both async stages suspend (the generator call, the poll loop). While they
//! are suspended a transcription or a stop can reset the turn, so each stage
//! re-checks the turn epoch and phase every time it resumes and quietly drops
//! its work if the turn moved on.

use crate::conversation::ConversationMessage;
use crate::error::VoiceError;
use crate::llm::GeneratedResponse;
use crate::native::{NativeCommand, SpeakRequest};
use crate::turn::phase::TurnPhase;
use crate::turn::session::{SessionState, TurnContext};
use crate::turn::timers::{StageTicket, TimerSlot};
use crate::ui::UiEvent;
use chrono::Utc;
use tokio::time::Instant;

/// Stage 1: call the generator and cache its reply.
pub(crate) async fn run_generation(ctx: &TurnContext, ticket: StageTicket) {
    let user_text = {
        let mut state = ctx.lock();
        if !state.enter_stage(TimerSlot::Llm, ticket) {
            return;
        }
        // A second fire for the same turn must not start a second call.
        if state.phase != TurnPhase::Arming {
            tracing::debug!(session = %ctx.id, phase = %state.phase, "generation already underway");
            return;
        }
        if !state.transition(&ctx.id, TurnPhase::Generating) {
            return;
        }
        state.transcript_at_last_reset.clone()
    };

    let mut history = match ctx.conversation.history(&ctx.conversation_id) {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(session = %ctx.id, error = %e, "conversation history unavailable");
            Vec::new()
        }
    };
    history.push(ConversationMessage::user(user_text.as_str()));

    tracing::info!(session = %ctx.id, turn = ticket.turn, "generating response");
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        ctx.pipeline.generation_timeout(),
        ctx.generator.generate(&history, &ctx.settings),
    )
    .await;

    let mut state = ctx.lock();
    if state.turn != ticket.turn || state.phase != TurnPhase::Generating {
        tracing::debug!(
            session = %ctx.id,
            turn = ticket.turn,
            current_turn = state.turn,
            phase = %state.phase,
            "discarding response for cancelled turn"
        );
        return;
    }

    let response = match outcome {
        Ok(Ok(response)) => {
            tracing::info!(
                session = %ctx.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = response.text.len(),
                "response ready"
            );
            response
        }
        Ok(Err(e)) => {
            tracing::warn!(session = %ctx.id, error = %e, "generation failed; using fallback reply");
            GeneratedResponse::text(ctx.pipeline.fallback_text.as_str())
        }
        Err(_) => {
            let err = VoiceError::GenerationTimeout {
                timeout_ms: ctx.pipeline.generation_timeout_ms,
            };
            tracing::warn!(session = %ctx.id, error = %err, "resetting pipeline");
            state.reset_pipeline(true);
            drop(state);
            show_user_message(ctx, &user_text);
            ctx.ui.emit(&ctx.id, UiEvent::error(err.to_string()));
            return;
        }
    };

    state.cached_response = Some(response);
    state.transition(&ctx.id, TurnPhase::AwaitingPlayback);
}

/// Stage 3: wait for the cached reply, then show and speak it.
pub(crate) async fn run_playback(ctx: &TurnContext, ticket: StageTicket) {
    {
        let mut state = ctx.lock();
        if !state.enter_stage(TimerSlot::Playback, ticket) {
            return;
        }
        if !state.phase.in_response_pipeline() {
            tracing::debug!(session = %ctx.id, phase = %state.phase, "playback stage: pipeline cancelled");
            return;
        }
    }

    let started = Instant::now();
    let deadline = started + ctx.pipeline.poll_timeout();
    loop {
        {
            let mut state = ctx.lock();
            if state.turn != ticket.turn || !state.phase.in_response_pipeline() {
                tracing::debug!(session = %ctx.id, "interrupted while waiting for response");
                return;
            }
            if let Some(response) = state.cached_response.take() {
                begin_playback(ctx, &mut state, response);
                return;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(ctx.pipeline.poll_interval()).await;
    }

    let user_text = {
        let mut state = ctx.lock();
        if state.turn != ticket.turn || !state.phase.in_response_pipeline() {
            return;
        }
        let user_text = state.transcript_at_last_reset.clone();
        state.reset_pipeline(true);
        user_text
    };
    let err = VoiceError::PlaybackPollTimeout {
        waited_ms: started.elapsed().as_millis() as u64,
    };
    tracing::warn!(session = %ctx.id, error = %err, "giving up on this turn");
    show_user_message(ctx, &user_text);
    ctx.ui.emit(&ctx.id, UiEvent::error(err.to_string()));
}

/// Show the turn and start speaking. Runs under the state lock so an
/// interruption can't slip in between the phase change and the `speak`.
fn begin_playback(ctx: &TurnContext, state: &mut SessionState, response: GeneratedResponse) {
    let user_text = state.transcript_at_last_reset.clone();

    if response.is_blank() {
        tracing::info!(session = %ctx.id, error = %VoiceError::EmptyResponse, "nothing to say");
        state.reset_pipeline(true);
        show_user_message(ctx, &user_text);
        return;
    }

    if !state.transition(&ctx.id, TurnPhase::Speaking) {
        state.reset_pipeline(true);
        return;
    }

    show_user_message(ctx, &user_text);
    if let Err(e) = ctx.conversation.append(
        &ctx.conversation_id,
        ConversationMessage::assistant(response.text.as_str()),
    ) {
        tracing::warn!(session = %ctx.id, error = %e, "failed to record assistant message");
    }
    ctx.ui.emit(
        &ctx.id,
        UiEvent::AiResponse {
            text: response.text.clone(),
            bubbles: response.bubbles,
            artifact: response.artifact,
            timestamp: Utc::now(),
        },
    );

    ctx.commands.send_or_log(&ctx.id, NativeCommand::ResetRecognition);
    ctx.commands.send_or_log(
        &ctx.id,
        NativeCommand::Speak(SpeakRequest {
            text: response.text,
            voice: ctx.settings.voice.clone(),
            rate: ctx.settings.rate,
        }),
    );
    tracing::info!(session = %ctx.id, turn = state.turn, "speaking response");
}

fn show_user_message(ctx: &TurnContext, text: &str) {
    if let Err(e) = ctx
        .conversation
        .append(&ctx.conversation_id, ConversationMessage::user(text))
    {
        tracing::warn!(session = %ctx.id, error = %e, "failed to record user message");
    }
    ctx.ui.emit(&ctx.id, UiEvent::user_message(text));
}

/// The engine finished speaking: close the turn and start recognition afresh.
pub(crate) fn on_speech_ended(ctx: &TurnContext) {
    let mut state = ctx.lock();
    if state.phase != TurnPhase::Speaking {
        // stop_speaking from an interruption echoes back as speech_ended.
        tracing::debug!(session = %ctx.id, phase = %state.phase, "ignoring speech_ended");
        return;
    }
    state.reset_pipeline(true);
    ctx.commands.send_or_log(&ctx.id, NativeCommand::ResetRecognition);
    tracing::info!(session = %ctx.id, turn = state.turn, "playback finished; ready for next turn");
}
