//! Bubble Voice: turn detection and interruption for a voice assistant.
//!
//! A native speech helper streams transcription updates over a line-delimited
//! JSON pipe. This crate decides when the user has finished a turn, asks a
//! response generator for a reply, shows and speaks it, and cancels all of
//! that the moment the user talks over it.
//!
//! # Architecture
//!
//! - **native**: wire protocol and child-process link to the speech helper
//! - **turn**: silence timer cascade, barge-in detector, response pipeline
//! - **manager**: per-session lifecycle and event routing
//! - **llm**: response generator seam and an OpenAI-compatible client
//! - **ui**: events published to the presentation layer
//! - **conversation**: message history per conversation

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod manager;
pub mod native;
pub mod turn;
pub mod ui;

pub use config::{SessionSettings, VoiceConfig};
pub use conversation::{ConversationStore, InMemoryConversationStore};
pub use error::{Result, VoiceError};
pub use llm::{GeneratedResponse, OpenAiCompatibleGenerator, ResponseGenerator};
pub use manager::{SessionManager, TranscriptObserver};
pub use native::{EngineLauncher, LoopbackLauncher, ProcessLauncher};
pub use turn::{SessionId, SessionSnapshot, TurnEngine, TurnPhase};
pub use ui::{UiEnvelope, UiEvent, UiSink};
