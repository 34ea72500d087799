//! Meter facade
//!
//! Bundles the transport, configuration, feed and poll switch into one owned
//! object that request handlers share by reference.

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigState, ConfigUpdate, MeasurementConfig, MeterSettings};
use crate::export;
use crate::feed::MeasurementFeed;
use crate::measurement::Measurement;
use crate::poller::{PollControl, PollState, Poller};
use crate::protocol::{Command, CommunicationChannel, ProtocolError, Transport};

/// Display string used when identification fails
pub const UNKNOWN_DEVICE: &str = "Unknown device";

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectOutcome {
    /// Whether the connection is open
    pub success: bool,
    /// Human-readable status
    pub message: String,
    /// `"<name> (<id>)"` or "Unknown device"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Result of a command with no payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Whether the command succeeded
    pub success: bool,
    /// Human-readable status
    pub message: String,
}

impl CommandOutcome {
    /// Successful outcome
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One LCR meter and everything derived from it
pub struct LcrMeter {
    settings: MeterSettings,
    transport: Arc<Transport>,
    config: ConfigState,
    feed: Arc<MeasurementFeed>,
    control: Arc<PollControl>,
}

impl LcrMeter {
    /// Create a disconnected meter
    pub fn new(settings: MeterSettings) -> Self {
        Self {
            transport: Arc::new(Transport::new(settings.connection())),
            feed: Arc::new(MeasurementFeed::new(settings.feed_capacity)),
            config: ConfigState::default(),
            control: Arc::new(PollControl::default()),
            settings,
        }
    }

    /// Runtime settings
    pub fn settings(&self) -> &MeterSettings {
        &self.settings
    }

    /// Underlying transport
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Measurement feed
    pub fn feed(&self) -> &Arc<MeasurementFeed> {
        &self.feed
    }

    // ---- connection lifecycle ----

    /// Open a serial port and identify the meter.
    ///
    /// An open connection is closed first. On failure the connection is left
    /// closed and the OS message is returned.
    pub fn connect(&self, port: &str) -> ConnectOutcome {
        match self.transport.open(port) {
            Ok(()) => self.identify(port),
            Err(e) => self.connect_failed(port, e),
        }
    }

    /// Like [`connect`](Self::connect) for an already-open channel.
    pub fn connect_channel(
        &self,
        label: &str,
        channel: Box<dyn CommunicationChannel>,
    ) -> ConnectOutcome {
        match self.transport.attach(label, channel) {
            Ok(()) => self.identify(label),
            Err(e) => self.connect_failed(label, e),
        }
    }

    fn connect_failed(&self, port: &str, error: ProtocolError) -> ConnectOutcome {
        warn!(port = %port, error = %error, "connection failed");
        let reason = match error {
            ProtocolError::ConnectionFailed(msg) => msg,
            other => other.to_string(),
        };
        ConnectOutcome {
            success: false,
            message: format!("Connection failed: {reason}"),
            device: None,
        }
    }

    fn identify(&self, port: &str) -> ConnectOutcome {
        let name = self.device_name().ok();
        let id = self.device_id().ok();
        let device = match (name, id) {
            (Some(name), Some(id)) => format!("{name} ({id})"),
            _ => UNKNOWN_DEVICE.to_string(),
        };
        info!(port = %port, device = %device, "meter connected");
        ConnectOutcome {
            success: true,
            message: format!("Connected to {port}"),
            device: Some(device),
        }
    }

    /// Close the connection. Always succeeds.
    pub fn disconnect(&self) -> CommandOutcome {
        self.transport.close();
        CommandOutcome::ok("Disconnected")
    }

    /// Check if a connection is open
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    // ---- device commands ----

    /// Opcode 64
    pub fn device_name(&self) -> Result<String, ProtocolError> {
        self.transport.query_text(&Command::GetName)
    }

    /// Opcode 65
    pub fn device_id(&self) -> Result<String, ProtocolError> {
        self.transport.query_text(&Command::GetId)
    }

    /// Opcode 66
    pub fn disable_avp(&self) -> Result<(), ProtocolError> {
        self.transport.send_acked(&Command::DisableAvp)
    }

    /// Opcode 67
    pub fn set_frequency(&self, hz: f64) -> Result<(), ProtocolError> {
        self.transport.set_frequency(hz)
    }

    /// Opcode 70
    pub fn set_offset(&self, value: f64) -> Result<(), ProtocolError> {
        self.transport.send_acked(&Command::set_offset(value)?)
    }

    /// Opcode 71
    pub fn reset_device(&self) -> Result<(), ProtocolError> {
        self.transport.send_acked(&Command::Reset)
    }

    // ---- configuration ----

    /// Current measurement configuration
    pub fn get_config(&self) -> MeasurementConfig {
        self.config.get()
    }

    /// Merge a partial configuration and mirror the frequency to the meter.
    pub fn set_config(&self, update: &ConfigUpdate) -> MeasurementConfig {
        self.config.update(update, &self.transport)
    }

    // ---- polling ----

    /// Begin polling. The feed is not cleared.
    pub fn start_measurement(&self) {
        self.control.start();
    }

    /// Stop polling after the current tick
    pub fn stop_measurement(&self) {
        self.control.stop();
    }

    /// Current poll state
    pub fn poll_state(&self) -> PollState {
        self.control.state()
    }

    /// Build the polling loop bound to this meter's state
    pub fn poller(&self) -> Poller {
        Poller::new(
            self.transport.clone(),
            self.feed.clone(),
            self.control.clone(),
            self.settings.active_poll(),
            self.settings.idle_poll(),
        )
    }

    /// Spawn the polling loop; it runs until `cancel` fires.
    pub fn spawn_poller(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.poller().spawn(cancel)
    }

    // ---- feed ----

    /// Most recent `limit` measurements, oldest first
    pub fn list_measurements(&self, limit: usize) -> Vec<Measurement> {
        self.feed.snapshot(limit)
    }

    /// Empty the feed
    pub fn clear_measurements(&self) {
        self.feed.clear();
    }

    /// CSV of every retained measurement, `None` when the feed is empty
    pub fn export_csv(&self) -> Option<Vec<u8>> {
        export::export_csv(&self.feed.all())
    }
}

impl Default for LcrMeter {
    fn default() -> Self {
        Self::new(MeterSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedMeter;

    #[test]
    fn test_connect_missing_port() {
        let meter = LcrMeter::default();
        let outcome = meter.connect("/dev/does-not-exist-lcr");
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Connection failed: "));
        assert_eq!(outcome.device, None);
        assert!(!meter.is_connected());
    }

    #[test]
    fn test_connect_simulator_identifies_device() {
        let meter = LcrMeter::default();
        let outcome = meter.connect_channel("simulator", Box::new(SimulatedMeter::with_seed(3)));
        assert_eq!(
            outcome,
            ConnectOutcome {
                success: true,
                message: "Connected to simulator".to_string(),
                device: Some("E728 (E728)".to_string()),
            }
        );
    }

    #[test]
    fn test_disconnect_when_closed() {
        let meter = LcrMeter::default();
        assert_eq!(meter.disconnect(), CommandOutcome::ok("Disconnected"));
    }

    fn simulated() -> (LcrMeter, crate::simulator::SimulatorHandle) {
        let meter = LcrMeter::default();
        let simulator = SimulatedMeter::with_seed(5);
        let device = simulator.handle();
        assert!(meter.connect_channel("simulator", Box::new(simulator)).success);
        (meter, device)
    }

    #[test]
    fn test_device_commands_reach_meter() {
        let (meter, device) = simulated();

        meter.disable_avp().unwrap();
        assert!(!device.snapshot().avp_enabled);

        meter.set_offset(2.5).unwrap();
        assert_eq!(device.snapshot().offset, 2.5);

        meter.set_frequency(250.0).unwrap();
        assert_eq!(device.snapshot().frequency_hz, 250.0);

        meter.reset_device().unwrap();
        let state = device.snapshot();
        assert!(state.avp_enabled);
        assert_eq!(state.offset, 0.0);
        assert_eq!(state.frequency_hz, 1000.0);
    }

    #[test]
    fn test_set_offset_out_of_range() {
        let (meter, device) = simulated();
        let err = meter.set_offset(5000.0).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidParameter(_)));
        assert_eq!(device.snapshot().offset, 0.0);
    }

    #[test]
    fn test_device_commands_need_connection() {
        let meter = LcrMeter::default();
        assert!(matches!(meter.disable_avp(), Err(ProtocolError::NotConnected)));
        assert!(matches!(meter.reset_device(), Err(ProtocolError::NotConnected)));
    }

    #[test]
    fn test_export_empty_feed() {
        assert_eq!(LcrMeter::default().export_csv(), None);
    }
}
