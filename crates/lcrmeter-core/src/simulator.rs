//! Simulated meter
//!
//! Speaks the device side of the binary protocol so the rest of the stack can
//! run without hardware. Readings hover around 100 Ω with a small random
//! phase angle.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use crate::measurement::{MeasurementFrame, Mode};
use crate::protocol::frame::{frequency_from_wire, frequency_to_wire};
use crate::protocol::{CommunicationChannel, Opcode, SENTINEL};

/// Name and id reported by the simulator
pub const SIMULATOR_IDENT: &[u8; 4] = b"E728";

/// Flag bit set on every completed measurement
pub const FLAG_COMPLETE: u8 = 0x80;
/// Flag bit set while Auto Voltage Protection is active
pub const FLAG_AVP: u8 = 0x01;

/// Device-side state visible to tests and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorState {
    /// Test frequency in Hz
    pub frequency_hz: f64,
    /// Last offset set with opcode 70
    pub offset: f64,
    /// Reported mode
    pub mode: Mode,
    /// Raw speed
    pub speed: u8,
    /// Raw range step
    pub range: u8,
    /// Auto Voltage Protection active
    pub avp_enabled: bool,
    /// Answer measurement requests with the not-ready byte
    pub not_ready: bool,
    /// Measurements served
    pub measurement_count: u64,
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            offset: 0.0,
            mode: Mode::Z,
            speed: 1,
            range: 0,
            avp_enabled: true,
            not_ready: false,
            measurement_count: 0,
        }
    }
}

impl SimulatorState {
    fn reset(&mut self) {
        let count = self.measurement_count;
        *self = Self {
            measurement_count: count,
            ..Self::default()
        };
    }
}

/// Shared view of a [`SimulatedMeter`]'s state
#[derive(Debug, Clone, Default)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatorHandle {
    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SimulatorState {
        self.lock().clone()
    }

    /// Toggle not-ready answers
    pub fn set_not_ready(&self, not_ready: bool) {
        self.lock().not_ready = not_ready;
    }

    /// Change the reported mode
    pub fn set_mode(&self, mode: Mode) {
        self.lock().mode = mode;
    }
}

/// In-memory channel emulating an E7-28 meter
pub struct SimulatedMeter {
    handle: SimulatorHandle,
    /// Bytes received but not yet forming a complete request
    inbox: Vec<u8>,
    /// Response bytes waiting to be read
    outbox: VecDeque<u8>,
    rng: StdRng,
}

impl Default for SimulatedMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMeter {
    /// Simulator seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic readings for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            handle: SimulatorHandle::default(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            rng,
        }
    }

    /// Shared view of the device state
    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }

    /// Consume complete requests from the inbox
    fn process_inbox(&mut self) {
        loop {
            // Resynchronize on the sentinel
            match self.inbox.iter().position(|&b| b == SENTINEL) {
                Some(0) => {}
                Some(n) => {
                    tracing::debug!(skipped = n, "simulator dropped bytes before sentinel");
                    self.inbox.drain(..n);
                }
                None => {
                    self.inbox.clear();
                    return;
                }
            }
            if self.inbox.len() < 2 {
                return;
            }

            let opcode_byte = self.inbox[1];
            let payload_len = Opcode::from_byte(opcode_byte)
                .map(Opcode::request_payload_len)
                .unwrap_or(0);
            if self.inbox.len() < 2 + payload_len {
                return;
            }

            let payload: Vec<u8> = self.inbox[2..2 + payload_len].to_vec();
            self.inbox.drain(..2 + payload_len);
            self.handle_request(opcode_byte, &payload);
        }
    }

    fn handle_request(&mut self, opcode_byte: u8, payload: &[u8]) {
        let Some(opcode) = Opcode::from_byte(opcode_byte) else {
            tracing::debug!(opcode = opcode_byte, "simulator echoing unknown opcode");
            self.respond(opcode_byte, &[]);
            return;
        };

        match opcode {
            Opcode::GetName | Opcode::GetId => self.respond(opcode_byte, SIMULATOR_IDENT),
            Opcode::DisableAvp => {
                self.handle.lock().avp_enabled = false;
                self.respond(opcode_byte, &[]);
            }
            Opcode::SetFrequency => {
                let raw = BigEndian::read_u32(payload);
                self.handle.lock().frequency_hz = frequency_from_wire(raw);
                self.respond(opcode_byte, &[]);
            }
            Opcode::SetOffset => {
                let raw = BigEndian::read_i16(payload);
                self.handle.lock().offset = raw as f64 / 10.0;
                self.respond(opcode_byte, &[]);
            }
            Opcode::Reset => {
                self.handle.lock().reset();
                self.respond(opcode_byte, &[]);
            }
            Opcode::GetMeasurement => {
                if self.handle.lock().not_ready {
                    self.respond(opcode_byte, &[0]);
                } else {
                    let body = self.next_reading();
                    self.respond(opcode_byte, &body);
                }
            }
        }
    }

    fn next_reading(&mut self) -> [u8; 22] {
        let impedance = 100.0 * (1.0 + 0.01 * self.rng.gen::<f32>());
        let phase = self.rng.gen_range(-0.5f32..0.5);

        let mut state = self.handle.lock();
        state.measurement_count += 1;

        let mut flags = FLAG_COMPLETE;
        if state.avp_enabled {
            flags |= FLAG_AVP;
        }

        MeasurementFrame {
            flags,
            mode: state.mode.to_raw().unwrap_or(0xFF),
            speed: state.speed,
            range: state.range,
            reserved: [0; 4],
            frequency_raw: frequency_to_wire(state.frequency_hz),
            impedance,
            phase,
        }
        .to_bytes()
    }

    fn respond(&mut self, opcode_byte: u8, data: &[u8]) {
        self.outbox.push_back(SENTINEL);
        self.outbox.push_back(opcode_byte);
        self.outbox.extend(data.iter().copied());
    }
}

impl Read for SimulatedMeter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response pending"));
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedMeter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        self.process_inbox();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for SimulatedMeter {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.outbox.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(meter: &mut SimulatedMeter, request: &[u8]) -> Vec<u8> {
        meter.write_all(request).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = meter.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_identity() {
        let mut meter = SimulatedMeter::with_seed(1);
        assert_eq!(roundtrip(&mut meter, &[0xAA, 64]), b"\xAA\x40E728".to_vec());
        assert_eq!(roundtrip(&mut meter, &[0xAA, 65]), b"\xAA\x41E728".to_vec());
    }

    #[test]
    fn test_set_frequency_uses_hundredths() {
        let mut meter = SimulatedMeter::with_seed(1);
        let handle = meter.handle();
        let response = roundtrip(&mut meter, &[0xAA, 67, 0x00, 0x0F, 0x42, 0x40]);
        assert_eq!(response, vec![0xAA, 67]);
        assert_eq!(handle.snapshot().frequency_hz, 10_000.0);
    }

    #[test]
    fn test_split_request_is_buffered() {
        let mut meter = SimulatedMeter::with_seed(1);
        meter.write_all(&[0xAA, 67, 0x00]).unwrap();
        let mut buf = [0u8; 8];
        assert!(meter.read(&mut buf).is_err());
        assert_eq!(roundtrip(&mut meter, &[0x01, 0x86, 0xA0]), vec![0xAA, 67]);
    }

    #[test]
    fn test_garbage_before_sentinel_is_dropped() {
        let mut meter = SimulatedMeter::with_seed(1);
        assert_eq!(roundtrip(&mut meter, &[0x00, 0x13, 0xAA, 71]), vec![0xAA, 71]);
    }

    #[test]
    fn test_measurement_frame() {
        let mut meter = SimulatedMeter::with_seed(7);
        let response = roundtrip(&mut meter, &[0xAA, 72, 0]);
        assert_eq!(response.len(), 24);
        assert_eq!(&response[..2], &[0xAA, 72]);

        let frame = MeasurementFrame::parse(&response[2..]).unwrap();
        assert_eq!(frame.flags, FLAG_COMPLETE | FLAG_AVP);
        assert_eq!(frame.mode, 3);
        assert_eq!(frame.frequency_hz(), 1000.0);
        assert!((100.0..=101.0).contains(&frame.impedance));
        assert!((-0.5..0.5).contains(&frame.phase));
    }

    #[test]
    fn test_mode_follows_handle() {
        let mut meter = SimulatedMeter::with_seed(7);
        meter.handle().set_mode(Mode::L);
        let response = roundtrip(&mut meter, &[0xAA, 72, 0]);
        assert_eq!(response[2 + 1], 0);
        assert_eq!(meter.handle().snapshot().measurement_count, 1);
    }

    #[test]
    fn test_not_ready() {
        let mut meter = SimulatedMeter::with_seed(7);
        meter.handle().set_not_ready(true);
        assert_eq!(roundtrip(&mut meter, &[0xAA, 72, 0]), vec![0xAA, 72, 0]);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut meter = SimulatedMeter::with_seed(7);
        let handle = meter.handle();
        roundtrip(&mut meter, &[0xAA, 66]);
        roundtrip(&mut meter, &[0xAA, 70, 0x00, 0x19]);
        assert!(!handle.snapshot().avp_enabled);
        assert_eq!(handle.snapshot().offset, 2.5);

        assert_eq!(roundtrip(&mut meter, &[0xAA, 71]), vec![0xAA, 71]);
        let state = handle.snapshot();
        assert!(state.avp_enabled);
        assert_eq!(state.offset, 0.0);
        assert_eq!(state.frequency_hz, 1000.0);
    }
}
