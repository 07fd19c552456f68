//! In-process speech engine backed by channels.
//!
//! Used by hosts that run recognition themselves and by the integration
//! tests, which play the part of the engine: they push events in and
//! inspect the commands the session sent out.

use crate::error::{Result, VoiceError};
use crate::native::link::{BridgeEvent, CommandSender, EngineLauncher, NativeLink};
use crate::native::protocol::{NativeCommand, NativeEvent, TranscriptionUpdate};
use crate::turn::SessionId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The engine side of a loopback link.
#[derive(Debug)]
pub struct LoopbackEngine {
    session: SessionId,
    commands: mpsc::UnboundedReceiver<NativeCommand>,
    events: mpsc::Sender<BridgeEvent>,
}

/// Create a connected link / engine pair.
#[must_use]
pub fn loopback(session: SessionId, event_capacity: usize) -> (NativeLink, LoopbackEngine) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
    let link = NativeLink {
        commands: CommandSender::new(command_tx),
        events: event_rx,
        process: None,
    };
    let engine = LoopbackEngine {
        session,
        commands: command_rx,
        events: event_tx,
    };
    (link, engine)
}

impl LoopbackEngine {
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Deliver an event to the session.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if the session stopped listening.
    pub async fn emit(&self, event: NativeEvent) -> Result<()> {
        self.events
            .send(BridgeEvent::Event(event))
            .await
            .map_err(|_| VoiceError::Channel("session no longer reading engine events".to_owned()))
    }

    /// Deliver a partial transcription.
    ///
    /// # Errors
    ///
    /// See [`emit`](Self::emit).
    pub async fn transcript(&self, text: &str) -> Result<()> {
        self.emit(NativeEvent::TranscriptionUpdate(TranscriptionUpdate::partial(text)))
            .await
    }

    /// Report that playback finished.
    ///
    /// # Errors
    ///
    /// See [`emit`](Self::emit).
    pub async fn speech_ended(&self) -> Result<()> {
        self.emit(NativeEvent::SpeechEnded).await
    }

    /// Simulate the engine process exiting.
    ///
    /// # Errors
    ///
    /// See [`emit`](Self::emit).
    pub async fn exit(&self, exit_code: Option<i32>) -> Result<()> {
        self.events
            .send(BridgeEvent::Exited { exit_code })
            .await
            .map_err(|_| VoiceError::Channel("session no longer reading engine events".to_owned()))
    }

    /// All commands received so far, without waiting.
    pub fn drain_commands(&mut self) -> Vec<NativeCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }

    /// Wait for the next command. `None` once the session dropped its sender.
    pub async fn next_command(&mut self) -> Option<NativeCommand> {
        self.commands.recv().await
    }
}

/// Launcher that hands each new session a loopback link and publishes the
/// engine half on a channel.
#[derive(Debug)]
pub struct LoopbackLauncher {
    event_capacity: usize,
    engines: mpsc::UnboundedSender<LoopbackEngine>,
}

impl LoopbackLauncher {
    /// Returns the launcher and the receiver on which engines appear, one per
    /// successful launch.
    #[must_use]
    pub fn new(event_capacity: usize) -> (Self, mpsc::UnboundedReceiver<LoopbackEngine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                event_capacity,
                engines: tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl EngineLauncher for LoopbackLauncher {
    async fn launch(&self, session: &SessionId) -> Result<NativeLink> {
        let (link, engine) = loopback(session.clone(), self.event_capacity);
        self.engines
            .send(engine)
            .map_err(|_| VoiceError::Channel("loopback engine receiver dropped".to_owned()))?;
        Ok(link)
    }
}
