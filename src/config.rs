//! Configuration types for voice sessions and the turn pipeline.

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Silence timer cascade offsets.
    pub turn: TurnTimingConfig,
    /// Response pipeline bounds.
    pub pipeline: ResponsePipelineConfig,
    /// Native speech engine process.
    pub native: NativeEngineConfig,
    /// OpenAI-compatible response generator.
    pub llm: LlmConfig,
    /// Default per-session settings used by hosts that don't supply their own.
    pub session: SessionSettings,
}

/// Offsets of the three silence timer stages, measured from the last reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnTimingConfig {
    /// Stage 1: start generating a response.
    pub llm_delay_ms: u64,
    /// Stage 2: reserved for speech pre-generation.
    pub tts_delay_ms: u64,
    /// Stage 3: show and speak the response.
    pub playback_delay_ms: u64,
    /// Extra silence required (on every stage) for very short utterances.
    ///
    /// One or two word answers ("yes", "stop") are often followed by a
    /// breath before the rest of the sentence. Set to 0 to disable.
    pub short_utterance_bonus_ms: u64,
    /// Utterances with at most this many words get `short_utterance_bonus_ms`.
    pub short_utterance_max_words: usize,
    /// Extra silence for medium utterances. Set to 0 to disable.
    pub medium_utterance_bonus_ms: u64,
    /// Utterances with at most this many words get `medium_utterance_bonus_ms`.
    pub medium_utterance_max_words: usize,
    /// Extra silence (on every stage) that confirms a short utterance is
    /// really over. Set to 0 to disable.
    pub silence_confirm_ms: u64,
    /// Utterances with fewer words than this need confirmation.
    pub confirm_max_words: usize,
    /// Utterances whose recognized audio is shorter than this need
    /// confirmation, regardless of word count.
    pub confirm_max_audio_ms: u64,
}

impl Default for TurnTimingConfig {
    fn default() -> Self {
        Self {
            llm_delay_ms: 500,
            tts_delay_ms: 1500,
            playback_delay_ms: 2000,
            short_utterance_bonus_ms: 0,
            short_utterance_max_words: 3,
            medium_utterance_bonus_ms: 0,
            medium_utterance_max_words: 6,
            silence_confirm_ms: 0,
            confirm_max_words: 6,
            confirm_max_audio_ms: 1800,
        }
    }
}

/// Resolved stage offsets for one cascade arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOffsets {
    pub llm: Duration,
    pub tts: Duration,
    pub playback: Duration,
}

impl TurnTimingConfig {
    /// Stage offsets for an utterance, including any adaptive bonus and
    /// confirmation window.
    ///
    /// `audio` is the span of recognized audio, when the engine reported it.
    #[must_use]
    pub fn offsets_for(&self, utterance: &str, audio: Option<Duration>) -> StageOffsets {
        let words = utterance.split_whitespace().count();
        let bonus = if words <= self.short_utterance_max_words {
            self.short_utterance_bonus_ms
        } else if words <= self.medium_utterance_max_words {
            self.medium_utterance_bonus_ms
        } else {
            0
        };
        let short_audio =
            audio.is_some_and(|span| span < Duration::from_millis(self.confirm_max_audio_ms));
        let confirm = if words < self.confirm_max_words || short_audio {
            self.silence_confirm_ms
        } else {
            0
        };
        let extra = bonus.saturating_add(confirm);
        StageOffsets {
            llm: Duration::from_millis(self.llm_delay_ms.saturating_add(extra)),
            tts: Duration::from_millis(self.tts_delay_ms.saturating_add(extra)),
            playback: Duration::from_millis(self.playback_delay_ms.saturating_add(extra)),
        }
    }
}

/// Bounds on the generation and playback stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePipelineConfig {
    /// How often the playback stage checks for a cached response.
    pub poll_interval_ms: u64,
    /// How long the playback stage waits before giving up.
    pub poll_timeout_ms: u64,
    /// Outer bound on a single generator call.
    pub generation_timeout_ms: u64,
    /// Response cached when the generator fails.
    pub fallback_text: String,
}

impl Default for ResponsePipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            poll_timeout_ms: 5_000,
            generation_timeout_ms: 30_000,
            fallback_text: "I'm sorry, I had trouble coming up with a response. Could you say that again?"
                .to_owned(),
        }
    }
}

impl ResponsePipelineConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// How to launch the native speech engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeEngineConfig {
    /// Path to the helper binary.
    pub program: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// Grace period between `stop_listening` and killing the process.
    pub stop_grace_ms: u64,
    /// Capacity of the inbound event channel.
    pub event_capacity: usize,
}

impl Default for NativeEngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("BubbleVoiceSpeech"),
            args: Vec::new(),
            stop_grace_ms: 500,
            event_capacity: 256,
        }
    }
}

impl NativeEngineConfig {
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL without the `/v1/...` suffix.
    pub base_url: String,
    /// Environment variable holding the API key. Empty means no auth header.
    pub api_key_env: String,
    /// System prompt sent before the conversation history.
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            system_prompt: "You are a warm, concise voice companion. Reply with a JSON object \
                            {\"text\": string, \"bubbles\": [string], \"artifact\": object|null}. \
                            Keep `text` short enough to be spoken aloud."
                .to_owned(),
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Per-session generation and voice parameters, fixed at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Model identifier passed to the generator.
    pub model: String,
    /// Native voice identifier (None = engine default).
    pub voice: Option<String>,
    /// Speaking rate in words per minute.
    pub rate: u32,
    /// Conversation to continue. None creates a new one.
    pub conversation_id: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            voice: None,
            rate: 180,
            conversation_id: None,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// loaded values fail [`validate`](Self::validate).
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| VoiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/bubble-voice/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bubble-voice")
            .join("config.toml")
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let t = &self.turn;
        if t.llm_delay_ms == 0 {
            return Err(VoiceError::Config("turn.llm_delay_ms must be > 0".to_owned()));
        }
        if !(t.llm_delay_ms < t.tts_delay_ms && t.tts_delay_ms < t.playback_delay_ms) {
            return Err(VoiceError::Config(format!(
                "turn delays must be strictly increasing (llm {} < tts {} < playback {})",
                t.llm_delay_ms, t.tts_delay_ms, t.playback_delay_ms
            )));
        }
        let p = &self.pipeline;
        if p.poll_interval_ms == 0 {
            return Err(VoiceError::Config(
                "pipeline.poll_interval_ms must be > 0".to_owned(),
            ));
        }
        if p.poll_timeout_ms < p.poll_interval_ms {
            return Err(VoiceError::Config(
                "pipeline.poll_timeout_ms must be >= poll_interval_ms".to_owned(),
            ));
        }
        if p.generation_timeout_ms == 0 {
            return Err(VoiceError::Config(
                "pipeline.generation_timeout_ms must be > 0".to_owned(),
            ));
        }
        if self.native.event_capacity == 0 {
            return Err(VoiceError::Config(
                "native.event_capacity must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}
