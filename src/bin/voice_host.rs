//! Headless voice host.
//!
//! Starts one voice session against the configured native speech helper and
//! writes every UI event as a JSON line to stdout. Usage:
//!
//! ```text
//! bubble-voice-host [CONFIG_PATH]
//! ```
//!
//! All tracing output goes to stderr so that stdout stays a clean event
//! stream.

use bubble_voice::{
    InMemoryConversationStore, OpenAiCompatibleGenerator, ProcessLauncher, SessionId,
    SessionManager, UiEnvelope, UiEvent, VoiceConfig,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(helper = %config.native.program.display(), llm = %config.llm.base_url, "bubble-voice-host starting");

    let manager = SessionManager::new(
        config.clone(),
        Arc::new(ProcessLauncher::new(config.native.clone())),
        Arc::new(OpenAiCompatibleGenerator::new(config.llm.clone())),
        Arc::new(InMemoryConversationStore::new()),
    );
    let mut events = manager.ui().subscribe();

    let id = SessionId::generate();
    manager
        .start(id.clone(), config.session.clone(), None)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start voice session: {e}"))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("interrupted");
        }
        () = forward_events(&mut events, &id) => {
            tracing::info!("session ended");
        }
    }

    manager.stop_all().await;
    tracing::info!("bubble-voice-host shut down cleanly");
    Ok(())
}

fn load_config() -> anyhow::Result<VoiceConfig> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(VoiceConfig::default_config_path);
    if path.exists() {
        tracing::info!(path = %path.display(), "loading config");
        VoiceConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    } else {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        Ok(VoiceConfig::default())
    }
}

/// Print UI events until the session stops listening.
async fn forward_events(events: &mut broadcast::Receiver<UiEnvelope>, id: &SessionId) {
    loop {
        match events.recv().await {
            Ok(envelope) => {
                print_envelope(&envelope);
                if envelope.session_id == *id
                    && matches!(envelope.event, UiEvent::ListeningChanged { listening: false })
                {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "ui event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_envelope(envelope: &UiEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
                tracing::warn!(error = %e, "failed to write ui event");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize ui event"),
    }
}
