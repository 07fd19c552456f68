//! Native speech engine child process.
//!
//! The engine is spawned with piped stdin/stdout. Three background tasks
//! translate between the process and the typed channels of a [`NativeLink`]:
//!
//! - **writer**: drains the command channel, writes one JSON line per command.
//! - **reader**: reads stdout line by line, decodes events, skips bad lines.
//! - **supervisor**: owns the child, waits for it to exit (or kills it on
//!   request), lets the reader drain, then sends a single
//!   [`BridgeEvent::Exited`] carrying the real exit code.
//!
//! Engine stderr is inherited so its diagnostics land next to ours.

use crate::config::NativeEngineConfig;
use crate::error::{Result, VoiceError};
use crate::native::link::{BridgeEvent, CommandSender, EngineLauncher, NativeLink};
use crate::native::protocol::{NativeCommand, parse_event_line};
use crate::turn::SessionId;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How long the supervisor waits for buffered stdout after the child exits.
const READER_DRAIN: Duration = Duration::from_secs(1);

/// A running engine process owned by exactly one session.
///
/// The child is killed when this value is dropped.
pub struct NativeProcess {
    session: SessionId,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<Option<i32>>>,
    writer: Option<JoinHandle<()>>,
}

impl NativeProcess {
    /// Spawn the engine described by `config` and wire it to a new link.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Spawn`] if the process cannot be started or its
    /// pipes cannot be captured.
    pub fn spawn(config: &NativeEngineConfig, session: &SessionId) -> Result<NativeLink> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(VoiceError::Spawn)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            VoiceError::Spawn(std::io::Error::other("failed to capture engine stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            VoiceError::Spawn(std::io::Error::other("failed to capture engine stdout"))
        })?;
        let pid = child.id();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (kill_tx, kill_rx) = oneshot::channel();

        let writer = tokio::spawn(write_commands(session.clone(), stdin, command_rx));
        let reader = tokio::spawn(read_events(session.clone(), stdout, event_tx.clone()));
        let supervisor = tokio::spawn(supervise(
            session.clone(),
            child,
            reader,
            event_tx,
            kill_rx,
        ));

        tracing::info!(
            session = %session,
            program = %config.program.display(),
            pid = ?pid,
            "speech engine spawned"
        );

        let process = Self {
            session: session.clone(),
            pid,
            kill: Some(kill_tx),
            supervisor: Some(supervisor),
            writer: Some(writer),
        };

        Ok(NativeLink {
            commands: CommandSender::new(command_tx),
            events: event_rx,
            process: Some(process),
        })
    }

    /// OS process id at spawn time.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Wait up to `grace` for the engine to exit on its own, then kill it.
    ///
    /// Returns the exit code when one was observed (`None` after a kill).
    pub async fn shutdown(&mut self, grace: Duration) -> Option<i32> {
        let Some(mut supervisor) = self.supervisor.take() else {
            return None;
        };
        let exit_code = match tokio::time::timeout(grace, &mut supervisor).await {
            Ok(joined) => joined.ok().flatten(),
            Err(_) => {
                tracing::debug!(session = %self.session, "speech engine ignored stop; killing");
                if let Some(kill) = self.kill.take() {
                    let _ = kill.send(());
                }
                supervisor.await.ok().flatten()
            }
        };
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        tracing::info!(session = %self.session, exit_code = ?exit_code, "speech engine shut down");
        exit_code
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        // Dropping the sender also tells the supervisor to kill.
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl std::fmt::Debug for NativeProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeProcess")
            .field("session", &self.session)
            .field("pid", &self.pid)
            .finish()
    }
}

async fn supervise(
    session: SessionId,
    mut child: Child,
    mut reader: JoinHandle<()>,
    events: mpsc::Sender<BridgeEvent>,
    mut kill: oneshot::Receiver<()>,
) -> Option<i32> {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill => {
            if let Err(e) = child.kill().await {
                tracing::warn!(session = %session, error = %e, "failed to kill speech engine");
            }
            child.wait().await
        }
    };
    let exit_code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(session = %session, error = %e, "failed to wait for speech engine");
            None
        }
    };

    // Deliver whatever the engine printed before it went away.
    if tokio::time::timeout(READER_DRAIN, &mut reader).await.is_err() {
        tracing::debug!(session = %session, "engine output still open after exit; dropping it");
        reader.abort();
    }

    tracing::info!(session = %session, exit_code = ?exit_code, "speech engine exited");
    let _ = events.send(BridgeEvent::Exited { exit_code }).await;
    exit_code
}

async fn write_commands(
    session: SessionId,
    stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<NativeCommand>,
) {
    let mut writer = BufWriter::new(stdin);
    while let Some(command) = commands.recv().await {
        let line = match command.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(session = %session, error = %e, "skipping engine command");
                continue;
            }
        };
        tracing::debug!(session = %session, command = command.name(), "-> engine");
        if let Err(e) = write_line(&mut writer, &line).await {
            tracing::warn!(
                session = %session,
                error = %e,
                "failed to write to speech engine; stopping command writer"
            );
            break;
        }
    }
}

async fn write_line(writer: &mut BufWriter<ChildStdin>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Read raw lines so that one line of invalid UTF-8 is skipped like any other
/// malformed line instead of ending the stream.
async fn read_events(session: SessionId, stdout: ChildStdout, tx: mpsc::Sender<BridgeEvent>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(
                            session = %session,
                            error = %e,
                            bytes = buf.len(),
                            "discarding engine line that is not UTF-8"
                        );
                        continue;
                    }
                };
                match parse_event_line(line) {
                    Ok(Some(event)) => {
                        if tx.send(BridgeEvent::Event(event)).await.is_err() {
                            // Session dropped its receiver.
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(session = %session, error = %e, "discarding malformed engine line");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "failed to read from speech engine");
                break;
            }
        }
    }
    tracing::debug!(session = %session, "speech engine output closed");
}

/// Launches the configured helper binary for every session.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: NativeEngineConfig,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(config: NativeEngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self, session: &SessionId) -> Result<NativeLink> {
        NativeProcess::spawn(&self.config, session)
    }
}
