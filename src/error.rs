//! Error types for the voice turn pipeline.

/// Top-level error type for voice sessions.
///
/// Every variant is scoped to a single session. Pipeline stages log these and
/// convert them into UI events; none of them should take down the host.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// A line from the native engine could not be decoded.
    #[error("failed to decode engine message: {source}")]
    Decode {
        /// The raw line as received (trimmed).
        line: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The native speech engine exited.
    #[error("speech engine exited (exit code: {exit_code:?})")]
    NativeProcessExit {
        /// The exit code, if available.
        exit_code: Option<i32>,
    },

    /// The native speech engine could not be launched.
    #[error("failed to spawn speech engine: {0}")]
    Spawn(#[source] std::io::Error),

    /// The response generator failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// The response generator did not finish within its outer bound.
    #[error("response generation timed out after {timeout_ms}ms")]
    GenerationTimeout {
        /// The configured bound in milliseconds.
        timeout_ms: u64,
    },

    /// Playback waited for a response that never arrived.
    #[error("no response was ready after waiting {waited_ms}ms")]
    PlaybackPollTimeout {
        /// How long the playback stage waited.
        waited_ms: u64,
    },

    /// The generator returned a valid but blank response.
    #[error("generator returned an empty response")]
    EmptyResponse,

    /// Session lifecycle error (duplicate start, unknown session).
    #[error("session error: {0}")]
    Session(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
