//! # GrblKit Communication
//!
//! Host-side Grbl 1.1 protocol support:
//! transports (serial and TCP), the line message decoder, the real-time
//! command codec, the character-counting program streamer and the
//! connection that ties them together.

pub mod communication;
pub mod firmware;

pub use communication::{
    open_transport,
    serial::{list_ports, SerialPortInfo},
    BoxedTransport, ConnectionDriver, ConnectionParams, SerialParity, Transport,
};

pub use firmware::grbl::{
    AckLink, ConnectionConfig, GrblConnection, GrblControllerState, Message, ProgramStreamer,
    PushMessage, RealTimeCommand, ResponseMessage, StreamSummary,
};
