//! # LCR Meter Core Library
//!
//! Device protocol and live measurement feed for E7-28 class LCR meters.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Binary frame encoding/decoding for the meter's serial protocol
//! - A serialized transport over serial ports or in-memory channels
//! - Measurement decoding into L/C/R/Z/θ values
//! - A bounded measurement feed filled by a background polling task
//! - CSV export and a protocol-level simulator
//!
//! ## Example
//!
//! ```rust,ignore
//! use lcrmeter_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let meter = std::sync::Arc::new(LcrMeter::new(MeterSettings::default()));
//! let outcome = meter.connect("/dev/ttyUSB0");
//! println!("{} - {:?}", outcome.message, outcome.device);
//!
//! let cancel = CancellationToken::new();
//! let poller = meter.spawn_poller(cancel.clone());
//! meter.start_measurement();
//! // ...
//! for m in meter.list_measurements(10) {
//!     println!("{} {:?} {:?}", m.mode, m.value, m.unit);
//! }
//! ```

pub mod config;
pub mod export;
pub mod feed;
pub mod measurement;
pub mod meter;
pub mod poller;
pub mod protocol;
pub mod simulator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigUpdate, MeasurementConfig, MeterSettings};
    pub use crate::feed::MeasurementFeed;
    pub use crate::measurement::{Measurement, Mode, Speed, Unit};
    pub use crate::meter::{CommandOutcome, ConnectOutcome, LcrMeter};
    pub use crate::poller::{PollState, Poller};
    pub use crate::protocol::{Command, ProtocolError, Transport};
    pub use crate::simulator::SimulatedMeter;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
