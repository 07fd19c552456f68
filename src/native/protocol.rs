//! Wire types for the native speech engine.
//!
//! Both directions use newline-delimited UTF-8 JSON objects of the form
//! `{"type": "...", "data": {...}}`. Variants without a payload omit `data`
//! on the way out and accept either a missing or `null` `data` on the way in.

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Commands (crate -> engine stdin)
// ---------------------------------------------------------------------------

/// A command written to the engine's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NativeCommand {
    /// Start capturing audio and emitting transcriptions.
    StartListening,
    /// Stop capturing audio.
    StopListening,
    /// Speak text aloud.
    Speak(SpeakRequest),
    /// Cut off any speech in progress.
    StopSpeaking,
    /// Drop accumulated recognition state so the next utterance starts clean.
    ResetRecognition,
}

/// Payload of [`NativeCommand::Speak`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Words per minute.
    pub rate: u32,
}

impl NativeCommand {
    /// Wire name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartListening => "start_listening",
            Self::StopListening => "stop_listening",
            Self::Speak(_) => "speak",
            Self::StopSpeaking => "stop_speaking",
            Self::ResetRecognition => "reset_recognition",
        }
    }

    /// Serialize to a single JSON line (without the trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Channel`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| VoiceError::Channel(format!("failed to serialize {}: {e}", self.name())))
    }
}

// ---------------------------------------------------------------------------
// Events (engine stdout -> crate)
// ---------------------------------------------------------------------------

/// An event read from the engine's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NativeEvent {
    /// The engine finished warming up.
    Ready,
    /// Incremental or final recognition result.
    TranscriptionUpdate(TranscriptionUpdate),
    /// Speech playback began.
    SpeechStarted,
    /// Speech playback finished (or was stopped).
    SpeechEnded,
    /// The recognizer restarted itself.
    RecognitionRestarted {
        #[serde(default)]
        reason: String,
    },
    /// Voices available for `speak`.
    VoicesList {
        #[serde(default)]
        voices: Vec<VoiceInfo>,
    },
    /// Engine-side error.
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Payload of [`NativeEvent::TranscriptionUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionUpdate {
    /// Best-known text of the current utterance.
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
    /// Start of the recognized audio, in seconds since listening began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_end_time: Option<f64>,
    /// Whether the engine was speaking when this audio was captured.
    #[serde(default)]
    pub is_speaking: bool,
}

impl TranscriptionUpdate {
    /// A partial update with only text set.
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            audio_start_time: None,
            audio_end_time: None,
            is_speaking: false,
        }
    }

    /// Length of the recognized audio, when the engine reported both ends.
    #[must_use]
    pub fn audio_span(&self) -> Option<Duration> {
        let (start, end) = (self.audio_start_time?, self.audio_end_time?);
        Duration::try_from_secs_f64(end - start).ok()
    }
}

/// One entry of a `voices_list` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

impl NativeEvent {
    /// Wire name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::TranscriptionUpdate(_) => "transcription_update",
            Self::SpeechStarted => "speech_started",
            Self::SpeechEnded => "speech_ended",
            Self::RecognitionRestarted { .. } => "recognition_restarted",
            Self::VoicesList { .. } => "voices_list",
            Self::Error { .. } => "error",
        }
    }
}

/// Parse one line of engine output.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`VoiceError::Decode`] for malformed JSON or unknown event types.
/// Callers log and skip these; a bad line never ends the stream.
pub fn parse_event_line(line: &str) -> Result<Option<NativeEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| VoiceError::Decode {
            line: trimmed.to_owned(),
            source,
        })
}
