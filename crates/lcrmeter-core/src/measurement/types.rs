use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement mode reported by the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Inductance
    L,
    /// Capacitance
    C,
    /// Resistance
    R,
    /// Impedance
    Z,
    /// Admittance
    Y,
    /// Quality factor
    Q,
    /// Dissipation factor
    D,
    /// Phase angle
    #[serde(rename = "θ")]
    Theta,
    /// Any raw value outside 0–7
    #[serde(rename = "?")]
    Unknown,
}

impl Mode {
    /// Decode the wire value
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Mode::L,
            1 => Mode::C,
            2 => Mode::R,
            3 => Mode::Z,
            4 => Mode::Y,
            5 => Mode::Q,
            6 => Mode::D,
            7 => Mode::Theta,
            _ => Mode::Unknown,
        }
    }

    /// Wire value, `None` for [`Mode::Unknown`]
    pub fn to_raw(self) -> Option<u8> {
        match self {
            Mode::L => Some(0),
            Mode::C => Some(1),
            Mode::R => Some(2),
            Mode::Z => Some(3),
            Mode::Y => Some(4),
            Mode::Q => Some(5),
            Mode::D => Some(6),
            Mode::Theta => Some(7),
            Mode::Unknown => None,
        }
    }

    /// Display symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Mode::L => "L",
            Mode::C => "C",
            Mode::R => "R",
            Mode::Z => "Z",
            Mode::Y => "Y",
            Mode::Q => "Q",
            Mode::D => "D",
            Mode::Theta => "θ",
            Mode::Unknown => "?",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Measurement speed reported by the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// Fast
    Fast,
    /// Normal
    Normal,
    /// Averaged
    Average,
    /// Any raw value above 2
    #[serde(rename = "?")]
    Unknown,
}

impl Speed {
    /// Decode the wire value
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Speed::Fast,
            1 => Speed::Normal,
            2 => Speed::Average,
            _ => Speed::Unknown,
        }
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Speed::Fast => "fast",
            Speed::Normal => "normal",
            Speed::Average => "average",
            Speed::Unknown => "?",
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a derived value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Henries
    #[serde(rename = "H")]
    Henry,
    /// Farads
    #[serde(rename = "F")]
    Farad,
    /// Ohms
    #[serde(rename = "Ω")]
    Ohm,
    /// Degrees
    #[serde(rename = "°")]
    Degree,
}

impl Unit {
    /// Unit symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Henry => "H",
            Unit::Farad => "F",
            Unit::Ohm => "Ω",
            Unit::Degree => "°",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
