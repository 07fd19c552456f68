//! Voice session registry and lifecycle.
//!
//! Each session gets its own speech engine, its own [`TurnEngine`] and an
//! event pump task that feeds engine events into the turn pipeline. The
//! registry is only used for routing and lifecycle; sessions never share
//! timers or processes.

use crate::config::{SessionSettings, VoiceConfig};
use crate::conversation::ConversationStore;
use crate::error::{Result, VoiceError};
use crate::llm::ResponseGenerator;
use crate::native::{
    BridgeEvent, CommandSender, EngineLauncher, NativeCommand, NativeEvent, NativeLink,
    NativeProcess, TranscriptionUpdate,
};
use crate::turn::{SessionId, TurnEngine, TurnEngineParts};
use crate::ui::{UiEvent, UiSink};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Observer called with every transcription update, before turn handling.
pub type TranscriptObserver = Arc<dyn Fn(&SessionId, &TranscriptionUpdate) + Send + Sync>;

struct SessionEntry {
    engine: TurnEngine,
    commands: CommandSender,
    process: Option<NativeProcess>,
    pump_cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// Starts, tracks and stops voice sessions.
pub struct SessionManager {
    config: VoiceConfig,
    launcher: Arc<dyn EngineLauncher>,
    generator: Arc<dyn ResponseGenerator>,
    conversation: Arc<dyn ConversationStore>,
    ui: UiSink,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_ids())
            .finish()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(
        config: VoiceConfig,
        launcher: Arc<dyn EngineLauncher>,
        generator: Arc<dyn ResponseGenerator>,
        conversation: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            config,
            launcher,
            generator,
            conversation,
            ui: UiSink::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Use an existing UI sink instead of a private one.
    #[must_use]
    pub fn with_ui_sink(mut self, ui: UiSink) -> Self {
        self.ui = ui;
        self
    }

    #[must_use]
    pub fn ui(&self) -> &UiSink {
        &self.ui
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a voice session: launch its engine, open its conversation and
    /// begin listening.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if the manager's config is invalid,
    /// [`VoiceError::Session`] if `id` is already active, or the launcher's /
    /// conversation store's error.
    pub async fn start(
        &self,
        id: SessionId,
        settings: SessionSettings,
        on_transcript: Option<TranscriptObserver>,
    ) -> Result<TurnEngine> {
        self.config.validate()?;
        if self.lock().contains_key(&id) {
            return Err(VoiceError::Session(format!("session {id} is already active")));
        }

        let NativeLink {
            commands,
            events,
            process,
        } = self.launcher.launch(&id).await?;

        let opened = self.conversation.open(settings.conversation_id.as_deref())?;

        let engine = TurnEngine::new(TurnEngineParts {
            id: id.clone(),
            settings,
            timing: self.config.turn.clone(),
            pipeline: self.config.pipeline.clone(),
            conversation_id: opened.id.clone(),
            commands: commands.clone(),
            generator: Arc::clone(&self.generator),
            conversation: Arc::clone(&self.conversation),
            ui: self.ui.clone(),
        });

        let pump_cancel = CancellationToken::new();
        let pump = tokio::spawn(run_event_pump(
            engine.clone(),
            events,
            on_transcript,
            pump_cancel.clone(),
        ));

        {
            let mut sessions = self.lock();
            if sessions.contains_key(&id) {
                // Lost a race with a concurrent start of the same id.
                pump_cancel.cancel();
                pump.abort();
                return Err(VoiceError::Session(format!("session {id} is already active")));
            }
            sessions.insert(
                id.clone(),
                SessionEntry {
                    engine: engine.clone(),
                    commands: commands.clone(),
                    process,
                    pump_cancel,
                    pump,
                },
            );
        }

        if opened.created {
            engine.ui_emit(UiEvent::ConversationCreated {
                conversation_id: opened.id,
                title: opened.title,
                timestamp: Utc::now(),
            });
        }

        commands.send_or_log(&id, NativeCommand::StartListening);
        engine.set_listening(true);
        tracing::info!(session = %id, conversation = %engine.conversation_id(), "voice session started");
        Ok(engine)
    }

    /// Stop a session and release its engine.
    ///
    /// Returns `false` when `id` was not active; stopping twice is not an error.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for engines whose
    /// shutdown can fail.
    pub async fn stop(&self, id: &SessionId) -> Result<bool> {
        let Some(mut entry) = self.lock().remove(id) else {
            tracing::debug!(session = %id, "stop: session not active");
            return Ok(false);
        };

        entry.engine.shutdown();
        entry.commands.send_or_log(id, NativeCommand::StopListening);
        entry.pump_cancel.cancel();

        if let Some(mut process) = entry.process.take() {
            process.shutdown(self.config.native.stop_grace()).await;
        }
        if let Err(e) = entry.pump.await {
            if !e.is_cancelled() {
                tracing::warn!(session = %id, error = %e, "event pump ended abnormally");
            }
        }

        tracing::info!(session = %id, "voice session stopped");
        Ok(true)
    }

    /// Stop every active session.
    pub async fn stop_all(&self) {
        for id in self.session_ids() {
            if let Err(e) = self.stop(&id).await {
                tracing::warn!(session = %id, error = %e, "failed to stop session");
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<TurnEngine> {
        self.lock().get(id).map(|entry| entry.engine.clone())
    }

    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Feed engine events into the turn pipeline until the engine exits or the
/// session is stopped.
async fn run_event_pump(
    engine: TurnEngine,
    mut events: mpsc::Receiver<BridgeEvent>,
    observer: Option<TranscriptObserver>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Some(BridgeEvent::Event(event)) => {
                handle_native_event(&engine, event, observer.as_ref());
            }
            Some(BridgeEvent::Exited { exit_code }) => {
                engine.engine_exited(exit_code);
                break;
            }
            None => {
                engine.engine_exited(None);
                break;
            }
        }
    }
    tracing::debug!(session = %engine.id(), "event pump finished");
}

fn handle_native_event(
    engine: &TurnEngine,
    event: NativeEvent,
    observer: Option<&TranscriptObserver>,
) {
    let session = engine.id();
    match event {
        NativeEvent::Ready => tracing::info!(session = %session, "speech engine ready"),
        NativeEvent::TranscriptionUpdate(update) => {
            if let Some(observer) = observer {
                observer(session, &update);
            }
            engine.on_transcript(&update);
        }
        NativeEvent::SpeechStarted => tracing::debug!(session = %session, "speech started"),
        NativeEvent::SpeechEnded => engine.on_speech_ended(),
        NativeEvent::RecognitionRestarted { reason } => {
            tracing::info!(session = %session, reason = %reason, "recognition restarted");
        }
        NativeEvent::VoicesList { voices } => {
            tracing::debug!(session = %session, count = voices.len(), "voices listed");
            engine.ui_emit(UiEvent::Voices { voices });
        }
        NativeEvent::Error { message } => {
            tracing::warn!(session = %session, message = %message, "speech engine error");
            engine.ui_emit(UiEvent::error(message));
        }
    }
}
