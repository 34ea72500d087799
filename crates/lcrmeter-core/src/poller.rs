//! Background measurement polling
//!
//! A two-state machine (idle / polling) driving a long-lived tokio task that
//! requests measurements from the meter and appends them to the feed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::feed::MeasurementFeed;
use crate::measurement::{self, Measurement};
use crate::protocol::{ProtocolError, Transport};

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// Waiting for start
    Idle,
    /// Requesting measurements
    Polling,
}

/// Shared start/stop switch observed by the polling task on every tick
#[derive(Debug, Default)]
pub struct PollControl {
    polling: AtomicBool,
}

impl PollControl {
    /// idle → polling. Leaves the feed untouched.
    pub fn start(&self) {
        if !self.polling.swap(true, Ordering::SeqCst) {
            info!("measurement polling started");
        }
    }

    /// polling → idle. An exchange already in flight completes normally.
    pub fn stop(&self) {
        if self.polling.swap(false, Ordering::SeqCst) {
            info!("measurement polling stopped");
        }
    }

    /// Check if polling is on
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Current state
    pub fn state(&self) -> PollState {
        if self.is_polling() {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }
}

/// The polling loop. Sole writer to the feed and sole issuer of opcode 72.
pub struct Poller {
    transport: Arc<Transport>,
    feed: Arc<MeasurementFeed>,
    control: Arc<PollControl>,
    active_period: Duration,
    idle_period: Duration,
}

impl Poller {
    /// Build a poller over shared meter state
    pub fn new(
        transport: Arc<Transport>,
        feed: Arc<MeasurementFeed>,
        control: Arc<PollControl>,
        active_period: Duration,
        idle_period: Duration,
    ) -> Self {
        Self {
            transport,
            feed,
            control,
            active_period,
            idle_period,
        }
    }

    /// Run one polling tick: request, decode, append.
    ///
    /// Blocks for up to the transport read timeout. Any failure skips the
    /// tick; nothing is retried.
    pub fn poll_once(&self) -> Option<Measurement> {
        if !self.transport.is_open() {
            return None;
        }

        match self.fetch() {
            Ok(Some(measurement)) => {
                self.feed.push(measurement.clone());
                Some(measurement)
            }
            Ok(None) => {
                debug!("meter reported no measurement ready");
                None
            }
            Err(ProtocolError::NotConnected) => None,
            Err(e) => {
                warn!(error = %e, "poll tick skipped");
                None
            }
        }
    }

    fn fetch(&self) -> Result<Option<Measurement>, ProtocolError> {
        match self.transport.request_measurement()? {
            Some(body) => Ok(Some(measurement::decode(&body)?)),
            None => Ok(None),
        }
    }

    /// Drive the loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let poller = Arc::new(self);
        info!(
            active_ms = poller.active_period.as_millis() as u64,
            idle_ms = poller.idle_period.as_millis() as u64,
            "measurement poller running"
        );

        loop {
            let period = if poller.control.is_polling() {
                let worker = poller.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || worker.poll_once()).await {
                    error!(error = %e, "poll tick aborted");
                }
                poller.active_period
            } else {
                poller.idle_period
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }

        info!("measurement poller shut down");
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
