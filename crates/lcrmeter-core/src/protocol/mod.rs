//! Serial Protocol Communication
//!
//! Implements the fixed binary command/response protocol spoken by E7-28 class
//! LCR meters.
//!
//! Every request frame is `0xAA, opcode[, payload...]` and every response frame
//! echoes the same two header bytes. The protocol carries no request ID, so the
//! [`Transport`] serializes exchanges to keep responses paired with requests.

pub mod commands;
mod error;
pub mod frame;
pub mod serial;
pub mod stream;
mod transport;

pub use commands::{Command, Opcode};
pub use error::ProtocolError;
pub use frame::{FrameBuilder, Response};
pub use serial::{list_ports, PortInfo};
pub use stream::{CommunicationChannel, SerialChannel};
pub use transport::{ConnectionConfig, Transport};

/// Sentinel byte that starts every request and response frame
pub const SENTINEL: u8 = 0xAA;

/// Default baud rate for meter communication
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Length of a measurement body, excluding the two header bytes
pub const MEASUREMENT_BODY_LEN: usize = 22;
