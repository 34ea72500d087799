//! Protocol commands
//!
//! Defines the opcodes understood by the meter and the typed commands built on
//! top of them.

use serde::{Deserialize, Serialize};

use super::{ProtocolError, MEASUREMENT_BODY_LEN};

/// Opcode byte carried in the second position of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Get device name (4 ASCII bytes)
    GetName = 64,
    /// Get device id (4 ASCII bytes)
    GetId = 65,
    /// Disable Auto Voltage Protection
    DisableAvp = 66,
    /// Set test frequency
    SetFrequency = 67,
    /// Set offset
    SetOffset = 70,
    /// Reset to factory defaults
    Reset = 71,
    /// Get full measurement data
    GetMeasurement = 72,
}

impl Opcode {
    /// Look up an opcode from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            64 => Some(Opcode::GetName),
            65 => Some(Opcode::GetId),
            66 => Some(Opcode::DisableAvp),
            67 => Some(Opcode::SetFrequency),
            70 => Some(Opcode::SetOffset),
            71 => Some(Opcode::Reset),
            72 => Some(Opcode::GetMeasurement),
            _ => None,
        }
    }

    /// Wire byte for this opcode
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Fixed request payload length that follows the two header bytes
    pub fn request_payload_len(self) -> usize {
        match self {
            Opcode::SetFrequency => 4,
            Opcode::SetOffset => 2,
            Opcode::GetMeasurement => 1,
            _ => 0,
        }
    }

    /// Number of response bytes to wait for, header included
    pub fn response_len(self) -> usize {
        match self {
            Opcode::GetName | Opcode::GetId => 6,
            Opcode::GetMeasurement => 2 + MEASUREMENT_BODY_LEN,
            _ => 2,
        }
    }

    /// Check if the meter answers this opcode with a bare acknowledgement
    pub fn expects_ack(self) -> bool {
        matches!(
            self,
            Opcode::DisableAvp | Opcode::SetFrequency | Opcode::SetOffset | Opcode::Reset
        )
    }
}

/// A command ready to be framed and sent to the meter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Opcode 64
    GetName,
    /// Opcode 65
    GetId,
    /// Opcode 66
    DisableAvp,
    /// Frequency in hertz; sent as `round(hz * 100)`
    SetFrequency {
        /// Hertz
        hz: f64,
    },
    /// Offset value; sent as `round(value * 10)`
    SetOffset {
        /// Offset in device units
        value: f64,
    },
    /// Opcode 71
    Reset,
    /// Opcode 72
    GetMeasurement,
}

impl Command {
    /// Build a set-frequency command, rejecting values the wire format cannot carry.
    pub fn set_frequency(hz: f64) -> Result<Self, ProtocolError> {
        if !hz.is_finite() || hz < 0.0 {
            return Err(ProtocolError::InvalidParameter(format!(
                "frequency must be a finite, non-negative number of hertz, got {hz}"
            )));
        }
        if (hz * 100.0).round() > u32::MAX as f64 {
            return Err(ProtocolError::InvalidParameter(format!(
                "frequency {hz} Hz does not fit the 32-bit wire field"
            )));
        }
        Ok(Command::SetFrequency { hz })
    }

    /// Build a set-offset command, rejecting values outside the int16 wire range.
    pub fn set_offset(value: f64) -> Result<Self, ProtocolError> {
        let scaled = (value * 10.0).round();
        if !value.is_finite() || scaled < i16::MIN as f64 || scaled > i16::MAX as f64 {
            return Err(ProtocolError::InvalidParameter(format!(
                "offset {value} does not fit the 16-bit wire field"
            )));
        }
        Ok(Command::SetOffset { value })
    }

    /// Opcode carried by this command
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::GetName => Opcode::GetName,
            Command::GetId => Opcode::GetId,
            Command::DisableAvp => Opcode::DisableAvp,
            Command::SetFrequency { .. } => Opcode::SetFrequency,
            Command::SetOffset { .. } => Opcode::SetOffset,
            Command::Reset => Opcode::Reset,
            Command::GetMeasurement => Opcode::GetMeasurement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes() {
        assert_eq!(Opcode::GetName.byte(), 64);
        assert_eq!(Opcode::SetFrequency.byte(), 67);
        assert_eq!(Opcode::GetMeasurement.byte(), 72);
        assert_eq!(Opcode::from_byte(70), Some(Opcode::SetOffset));
        assert_eq!(Opcode::from_byte(68), None);
    }

    #[test]
    fn test_response_lengths() {
        assert_eq!(Opcode::GetName.response_len(), 6);
        assert_eq!(Opcode::Reset.response_len(), 2);
        assert_eq!(Opcode::GetMeasurement.response_len(), 24);
    }

    #[test]
    fn test_set_frequency_validation() {
        assert!(Command::set_frequency(1000.0).is_ok());
        assert!(Command::set_frequency(-1.0).is_err());
        assert!(Command::set_frequency(f64::NAN).is_err());
        assert!(Command::set_frequency(f64::INFINITY).is_err());
        assert!(Command::set_frequency(1.0e9).is_err());
    }

    #[test]
    fn test_set_offset_validation() {
        assert!(Command::set_offset(-12.5).is_ok());
        assert!(Command::set_offset(5000.0).is_err());
    }
}
