//! Measurement configuration
//!
//! Holds the active measurement configuration and mirrors frequency changes
//! to the meter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{ConnectionConfig, Transport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Number of measurements kept in the feed by default
pub const DEFAULT_FEED_CAPACITY: usize = 100;

/// Runtime tuning for the meter, transport and polling loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Serial line speed
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub timeout_ms: u64,
    /// Measurements retained in the feed
    pub feed_capacity: usize,
    /// Poll period while measuring
    pub active_poll_ms: u64,
    /// Poll period while idle
    pub idle_poll_ms: u64,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            active_poll_ms: 100,
            idle_poll_ms: 500,
        }
    }
}

impl MeterSettings {
    /// Transport settings derived from these values
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            baud_rate: self.baud_rate,
            timeout_ms: self.timeout_ms,
        }
    }

    /// Poll period while measuring
    pub fn active_poll(&self) -> Duration {
        Duration::from_millis(self.active_poll_ms)
    }

    /// Poll period while idle
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// The measurement configuration shown to and edited by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Test frequency in Hz
    pub frequency: u32,
    /// Mode tag, e.g. "Z"
    pub mode: String,
    /// Speed tag, e.g. "normal"
    pub speed: String,
    /// "auto" or a fixed range step
    pub range: String,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            frequency: 1000,
            mode: "Z".to_string(),
            speed: "normal".to_string(),
            range: "auto".to_string(),
        }
    }
}

/// A partial configuration; absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// New frequency in Hz
    pub frequency: Option<u32>,
    /// New mode tag
    pub mode: Option<String>,
    /// New speed tag
    pub speed: Option<String>,
    /// New range tag
    pub range: Option<String>,
}

impl ConfigUpdate {
    /// Extract the recognized fields from a JSON object.
    ///
    /// Unknown keys and values of the wrong shape are skipped.
    pub fn from_json(fields: &Map<String, Value>) -> Self {
        let mut update = ConfigUpdate::default();
        for (key, value) in fields {
            match key.as_str() {
                "frequency" => {
                    update.frequency = parse_frequency(value);
                    if update.frequency.is_none() {
                        warn!(value = %value, "ignoring invalid frequency");
                    }
                }
                "mode" => update.mode = tag(value),
                "speed" => update.speed = tag(value),
                "range" => update.range = tag(value),
                other => debug!(field = other, "ignoring unrecognized config field"),
            }
        }
        update
    }

    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        self == &ConfigUpdate::default()
    }
}

fn parse_frequency(value: &Value) -> Option<u32> {
    let hz = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let hz = hz.round();
    if !hz.is_finite() || hz < 1.0 || hz > u32::MAX as f64 {
        return None;
    }
    Some(hz as u32)
}

fn tag(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Shared configuration state
#[derive(Debug, Default)]
pub struct ConfigState {
    current: Mutex<MeasurementConfig>,
}

impl ConfigState {
    /// Start from `initial`
    pub fn new(initial: MeasurementConfig) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MeasurementConfig> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current configuration snapshot
    pub fn get(&self) -> MeasurementConfig {
        self.lock().clone()
    }

    /// Merge an update into the configuration and return the result.
    pub fn apply(&self, update: &ConfigUpdate) -> MeasurementConfig {
        let mut current = self.lock();
        if let Some(frequency) = update.frequency {
            current.frequency = frequency;
        }
        if let Some(mode) = &update.mode {
            current.mode = mode.clone();
        }
        if let Some(speed) = &update.speed {
            current.speed = speed.clone();
        }
        if let Some(range) = &update.range {
            current.range = range.clone();
        }
        current.clone()
    }

    /// Merge an update, then push the resulting frequency to the meter if a
    /// connection is open.
    ///
    /// A failed push is logged and the local configuration is kept.
    pub fn update(&self, update: &ConfigUpdate, transport: &Transport) -> MeasurementConfig {
        let merged = self.apply(update);
        info!(
            frequency = merged.frequency,
            mode = %merged.mode,
            speed = %merged.speed,
            range = %merged.range,
            "configuration updated"
        );

        if transport.is_open() {
            if let Err(e) = transport.set_frequency(merged.frequency as f64) {
                warn!(frequency = merged.frequency, error = %e, "meter did not accept frequency");
            }
        }
        merged
    }
}
