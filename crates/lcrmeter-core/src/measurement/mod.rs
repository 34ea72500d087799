//! Measurement decoding
//!
//! Turns the 22-byte measurement body returned for opcode 72 into physical
//! quantities.
//!
//! Body layout (big-endian):
//!
//! | Offset | Size | Field                      |
//! |--------|------|----------------------------|
//! | 0      | 1    | flags                      |
//! | 1      | 1    | mode                       |
//! | 2      | 1    | speed                      |
//! | 3      | 1    | range                      |
//! | 4      | 4    | reserved (Uout1, Ucub)     |
//! | 8      | 4    | frequency × 100, `u32`     |
//! | 12     | 4    | impedance magnitude, `f32` |
//! | 16     | 4    | phase in radians, `f32`    |
//! | 20     | 2    | trailing, unused           |

mod frame;
mod types;

pub use frame::MeasurementFrame;
pub use types::{Mode, Speed, Unit};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Failure to interpret a measurement body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Body was not 22 bytes long
    #[error("measurement body must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required body length
        expected: usize,
        /// Length received
        actual: usize,
    },
}

/// A decoded reading with derived values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Local wall-clock capture time, millisecond precision
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Local>,
    /// Measurement mode
    pub mode: Mode,
    /// Test frequency in Hz
    pub frequency: f64,
    /// Impedance magnitude |Z| in ohms
    pub z_mag: f64,
    /// Phase angle in radians
    pub phase_rad: f64,
    /// Phase angle in degrees
    pub phase_deg: f64,
    /// Measurement speed
    pub speed: Speed,
    /// Raw range step as reported by the meter
    pub range: u8,
    /// Raw status flags
    pub flags: u8,
    /// Mode-specific derived value (L, C, R, Z and θ modes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Unit of `value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl Measurement {
    /// Build a measurement from an already parsed frame
    pub fn from_frame(frame: &MeasurementFrame, timestamp: DateTime<Local>) -> Self {
        let mode = Mode::from_raw(frame.mode);
        let frequency = frame.frequency_hz();
        let z_mag = frame.impedance as f64;
        let phase_rad = frame.phase as f64;
        let phase_deg = phase_rad.to_degrees();

        let (value, unit) = match derived_value(mode, frequency, z_mag, phase_deg) {
            Some((value, unit)) => (Some(value), Some(unit)),
            None => (None, None),
        };

        Self {
            timestamp: truncate_to_millis(timestamp),
            mode,
            frequency,
            z_mag,
            phase_rad,
            phase_deg,
            speed: Speed::from_raw(frame.speed),
            range: frame.range,
            flags: frame.flags,
            value,
            unit,
        }
    }
}

/// Decode a measurement body, stamping it with the current local time.
pub fn decode(payload: &[u8]) -> Result<Measurement, DecodeError> {
    decode_at(payload, Local::now())
}

/// Decode a measurement body with an explicit timestamp.
pub fn decode_at(payload: &[u8], timestamp: DateTime<Local>) -> Result<Measurement, DecodeError> {
    let frame = MeasurementFrame::parse(payload)?;
    Ok(Measurement::from_frame(&frame, timestamp))
}

/// Compute the value shown for a mode, if the mode has one.
///
/// Returns `None` when the result would not be finite (zero frequency or
/// zero impedance in the reactive modes).
pub fn derived_value(mode: Mode, frequency: f64, z_mag: f64, phase_deg: f64) -> Option<(f64, Unit)> {
    let omega = 2.0 * PI * frequency;
    let (value, unit) = match mode {
        Mode::L => (z_mag / omega, Unit::Henry),
        Mode::C => (1.0 / (z_mag * omega), Unit::Farad),
        Mode::R | Mode::Z => (z_mag, Unit::Ohm),
        Mode::Theta => (phase_deg, Unit::Degree),
        _ => return None,
    };
    value.is_finite().then_some((value, unit))
}

fn truncate_to_millis(ts: DateTime<Local>) -> DateTime<Local> {
    let nanos = ts.timestamp_subsec_nanos();
    ts - chrono::Duration::nanoseconds((nanos % 1_000_000) as i64)
}

/// `YYYY-MM-DD HH:MM:SS.mmm` in local time
pub mod timestamp_format {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// chrono format string
    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

    /// Serialize with [`FORMAT`]
    pub fn serialize<S>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ts.format(FORMAT))
    }

    /// Parse [`FORMAT`] as local time
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, FORMAT).map_err(de::Error::custom)?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| de::Error::custom(format!("nonexistent local time: {s}")))
    }
}
