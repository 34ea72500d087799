//! HTTP front end for an LCR meter.
//!
//! Wraps a single [`LcrMeter`] in an axum router. The binary in `main.rs`
//! wires it to a listener, a config file and the background poller.

pub mod api;
pub mod config;

use std::sync::Arc;

use lcrmeter_core::meter::LcrMeter;

/// Name of the pseudo-port that connects the built-in simulator
pub const SIMULATOR_PORT: &str = "simulator";

#[derive(Clone)]
pub struct AppState {
    pub meter: Arc<LcrMeter>,
    /// Offer the simulator as a connectable port
    pub simulator: bool,
}

impl AppState {
    pub fn new(meter: Arc<LcrMeter>, simulator: bool) -> Self {
        Self { meter, simulator }
    }
}
