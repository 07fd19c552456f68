//! End-to-end turn detection tests.
//!
//! A session runs against the in-process loopback engine and a scripted
//! generator. Tokio's clock is paused, so every timer fires at its exact
//! offset and the tests read as timelines.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bubble_voice::conversation::ConversationMessage;
use bubble_voice::native::{LoopbackEngine, NativeCommand, SpeakRequest, TranscriptionUpdate};
use bubble_voice::turn::TimerSlot;
use bubble_voice::{
    GeneratedResponse, InMemoryConversationStore, LoopbackLauncher, ResponseGenerator, SessionId,
    SessionManager, SessionSettings, TranscriptObserver, TurnEngine, TurnPhase, UiEnvelope,
    UiEvent, VoiceConfig, VoiceError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

// ────────────────────────────────────────────────────────────────────────────
// Scripted generator
// ────────────────────────────────────────────────────────────────────────────

struct Script {
    delay: Duration,
    outcome: Result<GeneratedResponse, String>,
}

impl Script {
    fn reply(text: &str) -> Self {
        Self::delayed(0, text)
    }

    fn delayed(ms: u64, text: &str) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            outcome: Ok(GeneratedResponse::text(text)),
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(message.to_owned()),
        }
    }
}

/// Replays queued scripts in order; once the queue is empty every call
/// answers "ok" immediately.
#[derive(Default)]
struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    /// (time of call, texts of the history passed in)
    calls: Mutex<Vec<(Instant, Vec<String>)>>,
}

impl ScriptedGenerator {
    fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn answering_ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> Vec<(Instant, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        history: &[ConversationMessage],
        _settings: &SessionSettings,
    ) -> bubble_voice::Result<GeneratedResponse> {
        let texts = history.iter().map(|m| m.text.clone()).collect();
        self.calls.lock().unwrap().push((Instant::now(), texts));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::reply("ok"));
        tokio::time::sleep(script.delay).await;
        script.outcome.map_err(VoiceError::Generation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

struct Harness {
    manager: SessionManager,
    id: SessionId,
    turn: TurnEngine,
    engine: LoopbackEngine,
    generator: Arc<ScriptedGenerator>,
    ui: broadcast::Receiver<UiEnvelope>,
    start: Instant,
}

impl Harness {
    async fn start(config: VoiceConfig, generator: Arc<ScriptedGenerator>) -> Self {
        Self::start_with_observer(config, generator, None).await
    }

    async fn start_with_observer(
        config: VoiceConfig,
        generator: Arc<ScriptedGenerator>,
        observer: Option<TranscriptObserver>,
    ) -> Self {
        let (launcher, mut engines) = LoopbackLauncher::new(64);
        let manager = SessionManager::new(
            config,
            Arc::new(launcher),
            Arc::clone(&generator) as Arc<dyn ResponseGenerator>,
            Arc::new(InMemoryConversationStore::new()),
        );
        let ui = manager.ui().subscribe();
        let id = SessionId::from("session-1");
        let turn = manager
            .start(id.clone(), SessionSettings::default(), observer)
            .await
            .unwrap();
        let engine = engines.recv().await.unwrap();
        Self {
            manager,
            id,
            turn,
            engine,
            generator,
            ui,
            start: Instant::now(),
        }
    }

    /// Advance the paused clock to `ms` after the session started.
    async fn at(&self, ms: u64) {
        tokio::time::sleep_until(self.start + Duration::from_millis(ms)).await;
    }

    async fn say(&self, ms: u64, text: &str) {
        self.at(ms).await;
        self.engine.transcript(text).await.unwrap();
    }

    fn commands(&mut self) -> Vec<NativeCommand> {
        self.engine.drain_commands()
    }

    fn ui_events(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.ui.try_recv() {
            assert_eq!(envelope.session_id, self.id);
            out.push(envelope.event);
        }
        out
    }

    fn generation_offsets_ms(&self) -> Vec<u64> {
        self.generator
            .calls()
            .iter()
            .map(|(at, _)| at.duration_since(self.start).as_millis() as u64)
            .collect()
    }

    /// The utterance each generation call answered.
    fn generation_texts(&self) -> Vec<String> {
        self.generator
            .calls()
            .into_iter()
            .map(|(_, texts)| texts.last().cloned().unwrap_or_default())
            .collect()
    }
}

fn spoken(commands: &[NativeCommand]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|c| match c {
            NativeCommand::Speak(SpeakRequest { text, .. }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn count(commands: &[NativeCommand], wanted: &NativeCommand) -> usize {
    commands.iter().filter(|c| *c == wanted).count()
}

fn user_messages(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::UserMessage { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn ai_responses(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::AiResponse { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn errors(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn assert_near(actual: u64, expected: u64) {
    assert!(
        actual >= expected && actual <= expected + 5,
        "expected ~{expected}ms, got {actual}ms"
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Debounce and playback
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn growing_utterance_generates_once_after_silence() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::new([Script::reply(
        "What's on tomorrow?",
    )]))
    .await;
    assert_eq!(h.commands(), vec![NativeCommand::StartListening]);

    h.say(0, "I").await;
    h.say(200, "I am").await;
    h.say(400, "I am worried").await;

    h.at(899).await;
    assert!(h.generation_offsets_ms().is_empty());
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Arming);

    h.at(1000).await;
    let offsets = h.generation_offsets_ms();
    assert_eq!(offsets.len(), 1);
    assert_near(offsets[0], 900);
    assert_eq!(h.generation_texts(), vec!["I am worried"]);
    assert_eq!(h.turn.snapshot().phase, TurnPhase::AwaitingPlayback);

    h.at(2500).await;
    let commands = h.commands();
    assert_eq!(spoken(&commands), vec!["What's on tomorrow?"]);
    assert_eq!(count(&commands, &NativeCommand::StopSpeaking), 0);
    assert_eq!(count(&commands, &NativeCommand::ResetRecognition), 1);
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Speaking);

    let events = h.ui_events();
    assert_eq!(user_messages(&events), vec!["I am worried"]);
    assert_eq!(ai_responses(&events), vec!["What's on tomorrow?"]);
}

#[tokio::test(start_paused = true)]
async fn blank_updates_do_not_arm() {
    let h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    h.say(0, "   ").await;
    h.say(100, "").await;
    h.at(3000).await;

    assert!(h.generation_offsets_ms().is_empty());
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Idle);
    assert!(snapshot.pending_timers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_reset_restarts_the_cascade() {
    let h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    h.say(0, "remind me").await;
    h.at(300).await;
    h.turn.reset_silence_timer();

    h.at(600).await;
    assert!(h.generation_offsets_ms().is_empty());
    h.at(900).await;
    let offsets = h.generation_offsets_ms();
    assert_eq!(offsets.len(), 1);
    assert_near(offsets[0], 800);
}

#[tokio::test(start_paused = true)]
async fn adaptive_bonus_delays_short_utterances() {
    let mut config = VoiceConfig::default();
    config.turn.short_utterance_bonus_ms = 400;
    let h = Harness::start(config, ScriptedGenerator::answering_ok()).await;

    h.say(0, "yes").await;
    h.at(600).await;
    assert!(h.generation_offsets_ms().is_empty());
    h.at(1000).await;
    let offsets = h.generation_offsets_ms();
    assert_eq!(offsets.len(), 1);
    assert_near(offsets[0], 900);
}

#[tokio::test(start_paused = true)]
async fn short_utterances_wait_for_confirmation_silence() {
    use bubble_voice::native::NativeEvent;

    let mut config = VoiceConfig::default();
    config.turn.silence_confirm_ms = 800;
    let h = Harness::start(config, ScriptedGenerator::answering_ok()).await;

    // Few words: every stage waits an extra 800ms.
    h.say(0, "yes").await;
    h.at(2900).await;
    assert!(h.turn.snapshot().tts_playing());
    h.engine.speech_ended().await.unwrap();

    // Enough words and no audio timing: plain cascade.
    h.say(3000, "I need to schedule a meeting for tomorrow afternoon").await;
    h.at(5100).await;
    assert!(h.turn.snapshot().tts_playing());
    h.engine.speech_ended().await.unwrap();

    // Enough words, but only 1.2s of audio.
    h.at(6000).await;
    h.engine
        .emit(NativeEvent::TranscriptionUpdate(TranscriptionUpdate {
            audio_start_time: Some(0.0),
            audio_end_time: Some(1.2),
            ..TranscriptionUpdate::partial("please book the usual table for four people tonight")
        }))
        .await
        .unwrap();
    h.at(7000).await;

    let offsets = h.generation_offsets_ms();
    assert_eq!(offsets.len(), 3);
    assert_near(offsets[0], 1300);
    assert_near(offsets[1], 3500);
    assert_near(offsets[2], 6800);
}

// ────────────────────────────────────────────────────────────────────────────
// Barge-in
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn barge_in_during_generation_discards_reply() {
    let mut h = Harness::start(
        VoiceConfig::default(),
        ScriptedGenerator::new([Script::delayed(1000, "first reply"), Script::reply("second reply")]),
    )
    .await;
    h.commands();

    h.say(0, "I").await;
    h.say(200, "I am").await;
    h.say(400, "I am worried").await;
    h.at(1000).await;
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Generating);

    h.say(1200, "wait, actually").await;
    h.at(1210).await;
    let commands = h.commands();
    assert_eq!(
        commands,
        vec![NativeCommand::StopSpeaking, NativeCommand::ResetRecognition]
    );
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Arming);
    assert!(!snapshot.has_cached_response);
    assert_eq!(snapshot.transcript_at_last_reset, "wait, actually");

    // The first call completes at 1900 and must be dropped.
    h.at(2000).await;
    let offsets = h.generation_offsets_ms();
    assert_eq!(offsets.len(), 2);
    assert_near(offsets[1], 1700);
    assert_eq!(h.generation_texts()[1], "wait, actually");

    h.at(3300).await;
    let commands = h.commands();
    assert_eq!(spoken(&commands), vec!["second reply"]);
    let events = h.ui_events();
    assert_eq!(ai_responses(&events), vec!["second reply"]);
    assert_eq!(user_messages(&events), vec!["wait, actually"]);
}

#[tokio::test(start_paused = true)]
async fn barge_in_while_waiting_for_a_slow_reply() {
    let mut h = Harness::start(
        VoiceConfig::default(),
        ScriptedGenerator::new([Script::delayed(3000, "late"), Script::reply("fresh")]),
    )
    .await;
    h.commands();

    h.say(0, "hello").await;

    // The tts stage found nothing to pre-generate and did nothing.
    h.at(1600).await;
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Generating);
    assert_eq!(snapshot.pending_timers, vec![TimerSlot::Playback]);
    assert!(h.commands().is_empty());

    // The playback stage is polling for the reply when the user speaks.
    h.at(2300).await;
    assert!(h.turn.snapshot().pending_timers.is_empty());
    h.say(2600, "actually never mind").await;
    h.at(2610).await;
    assert_eq!(
        h.commands(),
        vec![NativeCommand::StopSpeaking, NativeCommand::ResetRecognition]
    );
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Arming);

    // "late" resolves at 3500, after the barge-in, and is dropped.
    h.at(4700).await;
    assert_eq!(spoken(&h.commands()), vec!["fresh"]);
    let events = h.ui_events();
    assert_eq!(ai_responses(&events), vec!["fresh"]);
    assert_eq!(user_messages(&events), vec!["actually never mind"]);
    assert!(errors(&events).is_empty());
    assert_eq!(h.generation_texts(), vec!["hello", "actually never mind"]);
}

#[tokio::test(start_paused = true)]
async fn barge_in_while_speaking_stops_playback() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    h.say(0, "tell me a story").await;
    h.at(2100).await;
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Speaking);
    assert_eq!(spoken(&h.commands()), vec!["ok"]);

    h.say(3000, "stop").await;
    h.at(3010).await;
    assert_eq!(
        h.commands(),
        vec![NativeCommand::StopSpeaking, NativeCommand::ResetRecognition]
    );
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Arming);

    // The engine echoes the stop as speech_ended; the new turn is unaffected.
    h.engine.speech_ended().await.unwrap();
    h.at(3020).await;
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Arming);
    assert_eq!(snapshot.pending_timers.len(), 3);

    h.at(3600).await;
    assert_eq!(h.generation_texts(), vec!["tell me a story", "stop"]);
}

#[tokio::test(start_paused = true)]
async fn barge_in_while_awaiting_playback_drops_cached_reply() {
    let mut h = Harness::start(
        VoiceConfig::default(),
        ScriptedGenerator::new([Script::reply("stale"), Script::reply("fresh")]),
    )
    .await;
    h.commands();

    h.say(0, "what time is it").await;
    h.at(1000).await;
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::AwaitingPlayback);
    assert!(snapshot.has_cached_response);

    h.say(1500, "never mind").await;
    h.at(1510).await;
    let snapshot = h.turn.snapshot();
    assert!(!snapshot.has_cached_response);
    assert_eq!(snapshot.phase, TurnPhase::Arming);

    h.at(4000).await;
    assert_eq!(spoken(&h.commands()), vec!["fresh"]);
}

// ────────────────────────────────────────────────────────────────────────────
// Slow, failing and empty generations
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn late_generation_still_plays() {
    let mut h = Harness::start(
        VoiceConfig::default(),
        ScriptedGenerator::new([Script::delayed(3000, "took a while")]),
    )
    .await;

    h.say(0, "are you there").await;
    h.at(3000).await;
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Generating);
    assert!(spoken(&h.commands()).is_empty());

    h.at(3700).await;
    assert_eq!(spoken(&h.commands()), vec!["took a while"]);
    assert!(errors(&h.ui_events()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_timeout_surfaces_error_and_recovers() {
    let mut h = Harness::start(
        VoiceConfig::default(),
        ScriptedGenerator::new([Script::delayed(10_000, "far too late")]),
    )
    .await;

    h.say(0, "hello").await;
    h.at(7200).await;
    let events = h.ui_events();
    assert_eq!(user_messages(&events), vec!["hello"]);
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("no response was ready"), "{}", errs[0]);
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Idle);

    // The abandoned call completes later and is ignored.
    h.at(11_000).await;
    assert!(spoken(&h.commands()).is_empty());
    assert!(!h.turn.snapshot().has_cached_response);

    // Not stuck: the next utterance gets a fresh turn.
    h.say(11_000, "hello again").await;
    h.at(13_100).await;
    assert_eq!(spoken(&h.commands()), vec!["ok"]);
}

#[tokio::test(start_paused = true)]
async fn generation_timeout_resets_pipeline() {
    let mut config = VoiceConfig::default();
    config.pipeline.generation_timeout_ms = 1000;
    let mut h = Harness::start(
        config,
        ScriptedGenerator::new([Script::delayed(5000, "never shown")]),
    )
    .await;

    h.say(0, "slow question").await;
    h.at(1600).await;
    let events = h.ui_events();
    assert_eq!(user_messages(&events), vec!["slow question"]);
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("timed out"), "{}", errs[0]);

    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Idle);
    assert!(snapshot.pending_timers.is_empty());

    h.at(6000).await;
    assert!(spoken(&h.commands()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn generator_failure_speaks_fallback() {
    let config = VoiceConfig::default();
    let fallback = config.pipeline.fallback_text.clone();
    let mut h = Harness::start(config, ScriptedGenerator::new([Script::fail("boom")])).await;

    h.say(0, "hi").await;
    h.at(2100).await;
    assert_eq!(spoken(&h.commands()), vec![fallback.clone()]);
    assert_eq!(ai_responses(&h.ui_events()), vec![fallback]);
}

#[tokio::test(start_paused = true)]
async fn empty_response_is_not_spoken() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::new([Script::reply("  ")]))
        .await;

    h.say(0, "hmm").await;
    h.at(2100).await;

    let events = h.ui_events();
    assert!(ai_responses(&events).is_empty());
    assert_eq!(user_messages(&events), vec!["hmm"]);
    assert!(spoken(&h.commands()).is_empty());
    let snapshot = h.turn.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::Idle);
    assert!(!snapshot.in_response_pipeline());
}

// ────────────────────────────────────────────────────────────────────────────
// Playback completion
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn speech_ended_closes_the_turn() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    h.say(0, "thanks").await;
    h.at(2100).await;
    assert!(h.turn.snapshot().tts_playing());
    h.commands();

    h.engine.speech_ended().await.unwrap();
    h.at(2200).await;
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Idle);
    assert_eq!(h.commands(), vec![NativeCommand::ResetRecognition]);

    // A new utterance is a normal turn, not a barge-in.
    h.say(3000, "one more thing").await;
    h.at(3010).await;
    assert!(h.commands().is_empty());
    assert_eq!(h.turn.snapshot().phase, TurnPhase::Arming);
}

#[tokio::test(start_paused = true)]
async fn history_includes_previous_turns() {
    let h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    h.say(0, "first").await;
    h.at(2100).await;
    h.engine.speech_ended().await.unwrap();
    h.say(3000, "second").await;
    h.at(3600).await;

    assert_eq!(h.generation_texts(), vec!["first", "second"]);
    let calls = h.generator.calls();
    assert_eq!(calls[1].1, vec!["first", "ok", "second"]);
}

// ────────────────────────────────────────────────────────────────────────────
// Session lifecycle
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_emits_conversation_created_and_listening() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    let events = h.ui_events();
    assert!(matches!(
        &events[0],
        UiEvent::ConversationCreated { conversation_id, .. } if conversation_id == h.turn.conversation_id()
    ));
    assert!(events.contains(&UiEvent::ListeningChanged { listening: true }));
    assert!(h.turn.snapshot().listening);
    assert_eq!(h.manager.session_ids(), vec![h.id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_is_rejected() {
    let h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;

    let result = h
        .manager
        .start(h.id.clone(), SessionSettings::default(), None)
        .await;
    assert!(matches!(result, Err(VoiceError::Session(_))));
    assert_eq!(h.manager.session_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_rejects_invalid_config() {
    let mut config = VoiceConfig::default();
    config.turn.llm_delay_ms = 3000;
    let (launcher, _engines) = LoopbackLauncher::new(4);
    let manager = SessionManager::new(
        config,
        Arc::new(launcher),
        ScriptedGenerator::answering_ok() as Arc<dyn ResponseGenerator>,
        Arc::new(InMemoryConversationStore::new()),
    );

    let result = manager
        .start(SessionId::from("bad"), SessionSettings::default(), None)
        .await;
    assert!(matches!(result, Err(VoiceError::Config(_))));
    assert!(manager.session_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;
    h.say(0, "going away").await;
    h.at(10).await;
    h.commands();

    assert!(h.manager.stop(&h.id).await.unwrap());
    assert!(!h.manager.stop(&h.id).await.unwrap());
    assert!(h.manager.get(&h.id).is_none());
    assert!(h.manager.session_ids().is_empty());

    let snapshot = h.turn.snapshot();
    assert!(!snapshot.listening);
    assert!(snapshot.pending_timers.is_empty());
    assert_eq!(h.commands(), vec![NativeCommand::StopListening]);

    // Cancelled timers never fire.
    h.at(3000).await;
    assert!(h.generation_offsets_ms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn engine_exit_stops_listening() {
    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;
    h.ui_events();

    h.engine.exit(Some(1)).await.unwrap();
    h.at(10).await;

    assert!(!h.turn.snapshot().listening);
    let events = h.ui_events();
    assert!(events.contains(&UiEvent::ListeningChanged { listening: false }));
    let errs = errors(&events);
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("exited"), "{}", errs[0]);

    assert!(h.manager.stop(&h.id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn observer_sees_every_update() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer: TranscriptObserver = {
        let seen = Arc::clone(&seen);
        Arc::new(move |_id: &SessionId, update: &TranscriptionUpdate| {
            seen.lock().unwrap().push(update.text.clone());
        })
    };
    let h = Harness::start_with_observer(
        VoiceConfig::default(),
        ScriptedGenerator::answering_ok(),
        Some(observer),
    )
    .await;

    h.say(0, "a").await;
    h.say(50, "a b").await;
    h.say(100, "").await;
    h.at(150).await;

    assert_eq!(*seen.lock().unwrap(), vec!["a", "a b", ""]);
}

#[tokio::test(start_paused = true)]
async fn voices_and_engine_errors_reach_the_ui() {
    use bubble_voice::native::{NativeEvent, VoiceInfo};

    let mut h = Harness::start(VoiceConfig::default(), ScriptedGenerator::answering_ok()).await;
    h.ui_events();

    let voice = VoiceInfo {
        id: "com.apple.voice.Samantha".to_owned(),
        name: "Samantha".to_owned(),
        language: "en-US".to_owned(),
        quality: Some("enhanced".to_owned()),
    };
    h.engine
        .emit(NativeEvent::VoicesList {
            voices: vec![voice.clone()],
        })
        .await
        .unwrap();
    h.engine
        .emit(NativeEvent::Error {
            message: "microphone unavailable".to_owned(),
        })
        .await
        .unwrap();
    h.at(10).await;

    let events = h.ui_events();
    assert!(events.contains(&UiEvent::Voices { voices: vec![voice] }));
    assert_eq!(errors(&events), vec!["microphone unavailable"]);
}
