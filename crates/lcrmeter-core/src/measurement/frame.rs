use byteorder::{BigEndian, ByteOrder};

use super::DecodeError;
use crate::protocol::frame::frequency_from_wire;
use crate::protocol::MEASUREMENT_BODY_LEN;

/// Raw fields of a measurement body, before any unit conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementFrame {
    /// Status flags
    pub flags: u8,
    /// Raw mode, see [`Mode`](super::Mode)
    pub mode: u8,
    /// Raw speed, see [`Speed`](super::Speed)
    pub speed: u8,
    /// Range step
    pub range: u8,
    /// Uout1 / Ucub bytes, not interpreted
    pub reserved: [u8; 4],
    /// Frequency in hundredths of a hertz
    pub frequency_raw: u32,
    /// Impedance magnitude in ohms
    pub impedance: f32,
    /// Phase in radians
    pub phase: f32,
}

impl MeasurementFrame {
    /// Parse a 22-byte measurement body
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        if body.len() != MEASUREMENT_BODY_LEN {
            return Err(DecodeError::InvalidLength {
                expected: MEASUREMENT_BODY_LEN,
                actual: body.len(),
            });
        }

        let mut reserved = [0u8; 4];
        reserved.copy_from_slice(&body[4..8]);

        Ok(Self {
            flags: body[0],
            mode: body[1],
            speed: body[2],
            range: body[3],
            reserved,
            frequency_raw: BigEndian::read_u32(&body[8..12]),
            impedance: BigEndian::read_f32(&body[12..16]),
            phase: BigEndian::read_f32(&body[16..20]),
        })
    }

    /// Encode back into a 22-byte body (trailing bytes zeroed)
    pub fn to_bytes(&self) -> [u8; MEASUREMENT_BODY_LEN] {
        let mut body = [0u8; MEASUREMENT_BODY_LEN];
        body[0] = self.flags;
        body[1] = self.mode;
        body[2] = self.speed;
        body[3] = self.range;
        body[4..8].copy_from_slice(&self.reserved);
        BigEndian::write_u32(&mut body[8..12], self.frequency_raw);
        BigEndian::write_f32(&mut body[12..16], self.impedance);
        BigEndian::write_f32(&mut body[16..20], self.phase);
        body
    }

    /// Test frequency in Hz
    pub fn frequency_hz(&self) -> f64 {
        frequency_from_wire(self.frequency_raw)
    }
}
