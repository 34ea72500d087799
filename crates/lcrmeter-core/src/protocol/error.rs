//! Protocol errors

use thiserror::Error;

use crate::measurement::DecodeError;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Port could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No open connection
    #[error("Not connected to meter")]
    NotConnected,

    /// Driver-level serial failure
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Fewer bytes than the response needs
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes the response should have
        expected: usize,
        /// Bytes received before the timeout
        actual: usize,
    },

    /// Response of the wrong kind
    #[error("Invalid response from meter")]
    InvalidResponse,

    /// Acknowledgement missing or mismatched
    #[error("Meter did not acknowledge opcode {opcode}")]
    CommandRejected {
        /// Opcode that was sent
        opcode: u8,
    },

    /// Value cannot be encoded
    #[error("Invalid command parameter: {0}")]
    InvalidParameter(String),

    /// Measurement body could not be decoded
    #[error("Measurement decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Write or read failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error came from the exchange itself (timeout, short read,
    /// rejected ack) rather than from a missing connection.
    pub fn is_command_failure(&self) -> bool {
        !matches!(
            self,
            ProtocolError::NotConnected | ProtocolError::ConnectionFailed(_)
        )
    }
}
