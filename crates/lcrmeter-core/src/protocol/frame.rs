//! Frame encoding/decoding
//!
//! Request frame format:
//! - 1 byte: sentinel `0xAA`
//! - 1 byte: opcode
//! - N bytes: opcode-defined fixed payload (big-endian)
//!
//! Responses echo the same two header bytes, followed by 0, 4 (ASCII text) or
//! 22 (measurement body) bytes. A measurement request may instead be answered
//! with a single zero byte after the header when no reading is ready.

use byteorder::{BigEndian, ByteOrder};

use super::{Command, Opcode, MEASUREMENT_BODY_LEN, SENTINEL};

/// Length of a text response (header + 4 ASCII bytes)
pub const TEXT_RESPONSE_LEN: usize = 6;

/// Length of the not-ready answer to a measurement request
pub const NOT_READY_RESPONSE_LEN: usize = 3;

/// A decoded response, one variant per response kind
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Bare `0xAA, opcode` acknowledgement
    Ack,
    /// 4-byte ASCII text (device name or id)
    Text(String),
    /// 22-byte measurement body, header stripped
    Measurement([u8; MEASUREMENT_BODY_LEN]),
    /// Measurement requested but none is ready yet
    NotReady,
}

/// Builder for constructing request frames
pub struct FrameBuilder {
    bytes: Vec<u8>,
}

impl FrameBuilder {
    /// Start a frame for the given opcode
    pub fn new(opcode: Opcode) -> Self {
        let mut bytes = Vec::with_capacity(2 + opcode.request_payload_len());
        bytes.push(SENTINEL);
        bytes.push(opcode.byte());
        Self { bytes }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.bytes.push(b);
        self
    }

    /// Add a signed 16-bit value (big-endian)
    pub fn i16_be(mut self, value: i16) -> Self {
        let mut buf = [0u8; 2];
        BigEndian::write_i16(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
        self
    }

    /// Add a 32-bit value (big-endian)
    pub fn u32_be(mut self, value: u32) -> Self {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
        self
    }

    /// Finish the frame
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode a command into its request frame.
///
/// Parameters are range-checked when the [`Command`] is constructed, so
/// encoding itself never fails.
pub fn encode(command: &Command) -> Vec<u8> {
    let builder = FrameBuilder::new(command.opcode());
    match *command {
        Command::SetFrequency { hz } => builder.u32_be(frequency_to_wire(hz)).build(),
        Command::SetOffset { value } => builder.i16_be((value * 10.0).round() as i16).build(),
        Command::GetMeasurement => builder.byte(0).build(),
        _ => builder.build(),
    }
}

/// Scale a frequency in hertz to the wire's hundredths-of-a-hertz integer
pub fn frequency_to_wire(hz: f64) -> u32 {
    (hz * 100.0).round() as u32
}

/// Scale a wire frequency field back to hertz
pub fn frequency_from_wire(raw: u32) -> f64 {
    raw as f64 / 100.0
}

/// An acknowledgement is valid exactly when it is `0xAA` followed by the
/// requested opcode and nothing else.
pub fn decode_ack(bytes: &[u8], opcode: Opcode) -> bool {
    bytes.len() == 2 && bytes[0] == SENTINEL && bytes[1] == opcode.byte()
}

/// Decode a 6-byte text response into its 4 ASCII data bytes.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    if bytes.len() != TEXT_RESPONSE_LEN {
        return None;
    }
    let data = &bytes[2..];
    if !data.is_ascii() {
        return None;
    }
    Some(data.iter().map(|&b| b as char).collect())
}

/// Decode the answer to a measurement request.
pub fn decode_measurement(bytes: &[u8]) -> Option<Response> {
    let header_ok = bytes.len() >= 2
        && bytes[0] == SENTINEL
        && bytes[1] == Opcode::GetMeasurement.byte();
    if !header_ok {
        return None;
    }

    match bytes.len() {
        len if len == 2 + MEASUREMENT_BODY_LEN => {
            let mut body = [0u8; MEASUREMENT_BODY_LEN];
            body.copy_from_slice(&bytes[2..]);
            Some(Response::Measurement(body))
        }
        NOT_READY_RESPONSE_LEN if bytes[2] == 0 => Some(Response::NotReady),
        _ => None,
    }
}

/// Decode a raw response according to the opcode that was sent.
///
/// Returns `None` for any short, malformed or mismatched response; callers
/// treat that as a failed command.
pub fn decode_response(opcode: Opcode, bytes: &[u8]) -> Option<Response> {
    match opcode {
        Opcode::GetName | Opcode::GetId => decode_text(bytes).map(Response::Text),
        Opcode::GetMeasurement => decode_measurement(bytes),
        _ => decode_ack(bytes, opcode).then_some(Response::Ack),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_set_frequency() {
        let cmd = Command::set_frequency(1000.0).unwrap();
        // 1000 Hz * 100 = 100000 = 0x000186A0
        assert_eq!(encode(&cmd), vec![0xAA, 67, 0x00, 0x01, 0x86, 0xA0]);
    }

    #[test]
    fn test_encode_rounds_fractional_frequency() {
        let cmd = Command::set_frequency(99.999).unwrap();
        assert_eq!(&encode(&cmd)[2..], &10_000u32.to_be_bytes());
    }

    #[test]
    fn test_encode_get_measurement_has_poll_byte() {
        assert_eq!(encode(&Command::GetMeasurement), vec![0xAA, 72, 0]);
    }

    #[test]
    fn test_encode_bare_commands() {
        assert_eq!(encode(&Command::GetName), vec![0xAA, 64]);
        assert_eq!(encode(&Command::GetId), vec![0xAA, 65]);
        assert_eq!(encode(&Command::DisableAvp), vec![0xAA, 66]);
        assert_eq!(encode(&Command::Reset), vec![0xAA, 71]);
    }

    #[test]
    fn test_encode_set_offset() {
        let cmd = Command::set_offset(-1.5).unwrap();
        assert_eq!(encode(&cmd), vec![0xAA, 70, 0xFF, 0xF1]);
    }

    #[test]
    fn test_decode_ack() {
        assert!(decode_ack(&[0xAA, 67], Opcode::SetFrequency));
        assert!(!decode_ack(&[0xAA], Opcode::SetFrequency));
        assert!(!decode_ack(&[0xAB, 67], Opcode::SetFrequency));
        assert!(!decode_ack(&[0xAA, 66], Opcode::SetFrequency));
        assert!(!decode_ack(&[0xAA, 67, 0], Opcode::SetFrequency));
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"\xAA\x40E728"), Some("E728".to_string()));
        assert_eq!(decode_text(b"\xAA\x40E72"), None);
        assert_eq!(decode_text(b"\xAA\x40E7289"), None);
        assert_eq!(decode_text(&[0xAA, 0x40, 0xFF, b'7', b'2', b'8']), None);
    }

    #[test]
    fn test_decode_measurement_kinds() {
        let mut frame = vec![0xAA, 72];
        frame.extend_from_slice(&[0u8; MEASUREMENT_BODY_LEN]);
        assert!(matches!(
            decode_measurement(&frame),
            Some(Response::Measurement(_))
        ));

        assert_eq!(decode_measurement(&[0xAA, 72, 0]), Some(Response::NotReady));
        assert_eq!(decode_measurement(&[0xAA, 72, 1]), None);
        assert_eq!(decode_measurement(&frame[..10]), None);
        assert_eq!(decode_measurement(&[0xAA, 71, 0]), None);
    }
}
