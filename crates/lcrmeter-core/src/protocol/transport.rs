//! Connection management
//!
//! Owns the exclusive channel to the meter and serializes every
//! command/response exchange on it.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    frame::{self, Response},
    serial::{clear_buffers, open_port},
    Command, CommunicationChannel, ProtocolError, SerialChannel, DEFAULT_BAUD_RATE,
    DEFAULT_TIMEOUT_MS,
};

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Read timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

struct OpenChannel {
    port_name: String,
    channel: Box<dyn CommunicationChannel>,
}

/// Exclusive, serialized access to the meter.
///
/// A single mutex guards the channel for the whole write+read of each
/// exchange, and also for open/close, so a command issued from a request
/// handler can never interleave with the polling loop's measurement reads.
pub struct Transport {
    channel: Mutex<Option<OpenChannel>>,
    config: ConnectionConfig,
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
}

impl Transport {
    /// Create a transport with no open connection
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            channel: Mutex::new(None),
            config,
            tx_bytes: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
        }
    }

    /// Connection settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenChannel>> {
        // Every mutation of the slot is a single assignment, so a poisoned
        // guard still holds a consistent value.
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a serial port, closing any connection that is already open.
    pub fn open(&self, port_name: &str) -> Result<(), ProtocolError> {
        let mut guard = self.lock();
        if let Some(previous) = guard.take() {
            info!(port = %previous.port_name, "closing previous connection before reconnect");
        }

        let mut port = open_port(port_name, self.config.baud_rate, self.config.timeout())?;
        if let Err(e) = clear_buffers(port.as_mut()) {
            debug!(port = %port_name, error = %e, "could not clear buffers after open");
        }

        info!(port = %port_name, baud = self.config.baud_rate, "serial port opened");
        *guard = Some(OpenChannel {
            port_name: port_name.to_string(),
            channel: Box::new(SerialChannel::new(port)),
        });
        Ok(())
    }

    /// Attach an already-open channel (simulator or test double), replacing
    /// any existing connection.
    pub fn attach(
        &self,
        label: &str,
        mut channel: Box<dyn CommunicationChannel>,
    ) -> Result<(), ProtocolError> {
        channel.set_timeout(self.config.timeout())?;
        let mut guard = self.lock();
        if let Some(previous) = guard.take() {
            info!(port = %previous.port_name, "closing previous connection before reconnect");
        }
        info!(port = %label, "channel attached");
        *guard = Some(OpenChannel {
            port_name: label.to_string(),
            channel,
        });
        Ok(())
    }

    /// Close the connection if open. Never fails.
    pub fn close(&self) {
        if let Some(previous) = self.lock().take() {
            info!(port = %previous.port_name, "connection closed");
        }
    }

    /// Check if a connection is open
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Name of the open port, if any
    pub fn port_name(&self) -> Option<String> {
        self.lock().as_ref().map(|open| open.port_name.clone())
    }

    /// Get cumulative tx/rx byte counters
    pub fn get_counters(&self) -> (u64, u64) {
        (
            self.tx_bytes.load(Ordering::Relaxed),
            self.rx_bytes.load(Ordering::Relaxed),
        )
    }

    /// Write `request` then read until `expected_len` bytes arrive or the read
    /// timeout elapses. A short read is returned as-is.
    pub fn exchange(&self, request: &[u8], expected_len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut guard = self.lock();
        let open = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let channel = open.channel.as_mut();

        if let Err(e) = channel.clear_input_buffer() {
            debug!(error = %e, "could not clear input buffer before send");
        }

        debug!(bytes = ?request, "sending frame");
        channel.write_all(request)?;
        channel.flush()?;
        self.tx_bytes
            .fetch_add(request.len() as u64, Ordering::Relaxed);

        let response = read_until(channel, expected_len, self.config.timeout())?;
        self.rx_bytes
            .fetch_add(response.len() as u64, Ordering::Relaxed);

        if response.len() < expected_len {
            debug!(
                expected = expected_len,
                actual = response.len(),
                bytes = ?response,
                "short read"
            );
        }
        Ok(response)
    }

    /// Encode, exchange and decode a command.
    ///
    /// Any response that does not match the command's expected shape is
    /// reported as a failed command.
    pub fn send(&self, command: &Command) -> Result<Response, ProtocolError> {
        let opcode = command.opcode();
        let request = frame::encode(command);
        let raw = self.exchange(&request, opcode.response_len())?;

        match frame::decode_response(opcode, &raw) {
            Some(response) => Ok(response),
            None if opcode.expects_ack() => {
                warn!(opcode = opcode.byte(), bytes = ?raw, "command not acknowledged");
                Err(ProtocolError::CommandRejected {
                    opcode: opcode.byte(),
                })
            }
            None if raw.len() < opcode.response_len() => Err(ProtocolError::ShortRead {
                expected: opcode.response_len(),
                actual: raw.len(),
            }),
            None => Err(ProtocolError::InvalidResponse),
        }
    }

    /// Send a command that is answered with a bare acknowledgement.
    pub fn send_acked(&self, command: &Command) -> Result<(), ProtocolError> {
        match self.send(command)? {
            Response::Ack => Ok(()),
            _ => Err(ProtocolError::InvalidResponse),
        }
    }

    /// Send a command that is answered with 4 ASCII bytes.
    pub fn query_text(&self, command: &Command) -> Result<String, ProtocolError> {
        match self.send(command)? {
            Response::Text(text) => Ok(text),
            _ => Err(ProtocolError::InvalidResponse),
        }
    }

    /// Request one measurement body. `Ok(None)` means the meter had no reading ready.
    pub fn request_measurement(&self) -> Result<Option<[u8; super::MEASUREMENT_BODY_LEN]>, ProtocolError> {
        match self.send(&Command::GetMeasurement)? {
            Response::Measurement(body) => Ok(Some(body)),
            Response::NotReady => Ok(None),
            _ => Err(ProtocolError::InvalidResponse),
        }
    }

    /// Push a new test frequency to the meter.
    pub fn set_frequency(&self, hz: f64) -> Result<(), ProtocolError> {
        self.send_acked(&Command::set_frequency(hz)?)
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

/// Read up to `expected` bytes, stopping early at `timeout`, EOF, or a read
/// timeout reported by the channel.
fn read_until(
    channel: &mut dyn CommunicationChannel,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; expected];
    let mut filled = 0;

    while filled < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        channel.set_timeout(remaining)?;

        match channel.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(ProtocolError::IoError(e)),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}
