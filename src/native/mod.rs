//! Native speech engine boundary: wire protocol, child process, typed link.

pub mod link;
pub mod loopback;
pub mod process;
pub mod protocol;

pub use link::{BridgeEvent, CommandSender, EngineLauncher, NativeLink};
pub use loopback::{LoopbackEngine, LoopbackLauncher, loopback};
pub use process::{NativeProcess, ProcessLauncher};
pub use protocol::{
    NativeCommand, NativeEvent, SpeakRequest, TranscriptionUpdate, VoiceInfo, parse_event_line,
};
