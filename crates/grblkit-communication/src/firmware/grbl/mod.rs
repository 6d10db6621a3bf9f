//! Grbl 1.1 protocol
//!
//! - [`message`]: classifies received lines into responses and push messages
//! - [`realtime`]: single-byte out-of-band commands
//! - [`streamer`]: character-counting program streaming
//! - [`controller`]: the connection owning the transport

pub mod compile_options;
pub mod controller;
pub mod error_decoder;
pub mod gcode_params;
pub mod gcode_state;
pub mod message;
pub mod push;
pub mod realtime;
pub mod status_report;
pub mod streamer;

pub use compile_options::CompileTimeOptions;
pub use controller::{ConnectionConfig, GrblConnection, GrblControllerState};
pub use gcode_params::{Coordinates, GcodeParam, GcodeParameters, ProbeResult};
pub use gcode_state::GcodeState;
pub use message::{Message, ResponseMessage};
pub use push::PushMessage;
pub use realtime::{split_realtime, NotRealTimeCommand, RealTimeCommand};
pub use status_report::{
    AccessoryState, BufferState, FeedSpindle, MachineState, Overrides, PinState, StatusReport,
};
pub use streamer::{AckLink, ProgramStreamer, StreamSummary};
