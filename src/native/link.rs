//! Typed channel boundary between a voice session and its speech engine.

use crate::error::{Result, VoiceError};
use crate::native::process::NativeProcess;
use crate::native::protocol::{NativeCommand, NativeEvent};
use crate::turn::SessionId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something the session learns from its engine.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A decoded protocol event.
    Event(NativeEvent),
    /// The engine's output closed. Delivered at most once, always last.
    Exited { exit_code: Option<i32> },
}

/// Cloneable handle for sending commands to the engine.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<NativeCommand>,
}

impl CommandSender {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<NativeCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command for the engine.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if the engine side has gone away.
    pub fn send(&self, command: NativeCommand) -> Result<()> {
        let name = command.name();
        self.tx
            .send(command)
            .map_err(|_| VoiceError::Channel(format!("speech engine closed; dropped {name}")))
    }

    /// Queue a command, logging instead of failing when the engine is gone.
    ///
    /// Pipeline stages use this: a dead engine is reported separately through
    /// [`BridgeEvent::Exited`].
    pub fn send_or_log(&self, session: &SessionId, command: NativeCommand) {
        if let Err(e) = self.send(command) {
            tracing::warn!(session = %session, error = %e, "engine command not delivered");
        }
    }

    /// Returns `true` once the receiving side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A connected engine: command sender, event stream and (for real
/// processes) the child handle that must be shut down with the session.
pub struct NativeLink {
    pub commands: CommandSender,
    pub events: mpsc::Receiver<BridgeEvent>,
    pub process: Option<NativeProcess>,
}

impl std::fmt::Debug for NativeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLink")
            .field("commands_closed", &self.commands.is_closed())
            .field("has_process", &self.process.is_some())
            .finish()
    }
}

/// Starts one speech engine per session.
#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
    /// Launch an engine for `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be started.
    async fn launch(&self, session: &SessionId) -> Result<NativeLink>;
}
