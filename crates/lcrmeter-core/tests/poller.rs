//! Polling loop against the simulated meter

use lcrmeter_core::config::{ConfigUpdate, MeterSettings};
use lcrmeter_core::meter::LcrMeter;
use lcrmeter_core::poller::PollState;
use lcrmeter_core::protocol::CommunicationChannel;
use lcrmeter_core::simulator::SimulatedMeter;
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Simulator front that refuses frequency changes and answers the first
/// `garbage` measurement requests with a truncated frame.
struct Unreliable {
    inner: SimulatedMeter,
    garbage: usize,
    pending: Vec<u8>,
}

impl Unreliable {
    fn new(garbage: usize) -> Self {
        Self {
            inner: SimulatedMeter::with_seed(9),
            garbage,
            pending: Vec::new(),
        }
    }
}

impl Read for Unreliable {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return self.inner.read(buf);
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for Unreliable {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match buf {
            [0xAA, 67, ..] => self.pending = vec![0xAA, 0x00],
            [0xAA, 72, ..] if self.garbage > 0 => {
                self.garbage -= 1;
                self.pending = vec![0xAA, 72, 0x01, 0x02];
            }
            _ => return self.inner.write(buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl CommunicationChannel for Unreliable {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.set_timeout(timeout)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.inner.clear_input_buffer()
    }
}

fn fast_settings() -> MeterSettings {
    MeterSettings {
        active_poll_ms: 5,
        idle_poll_ms: 5,
        timeout_ms: 200,
        ..MeterSettings::default()
    }
}

async fn wait_for_len(meter: &LcrMeter, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while meter.feed().len() < len {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("feed did not fill in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_fills_feed_until_stopped() {
    let meter = LcrMeter::new(fast_settings());
    assert!(meter.connect_channel("simulator", Box::new(SimulatedMeter::with_seed(1))).success);

    let cancel = CancellationToken::new();
    let handle = meter.spawn_poller(cancel.clone());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(meter.feed().is_empty(), "idle poller must not append");

    meter.start_measurement();
    assert_eq!(meter.poll_state(), PollState::Polling);
    wait_for_len(&meter, 5).await;

    meter.stop_measurement();
    // Allow an in-flight tick to land
    tokio::time::sleep(Duration::from_millis(30)).await;
    let settled = meter.feed().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(meter.feed().len(), settled);

    let readings = meter.list_measurements(100);
    assert!(readings.iter().all(|m| (m.frequency - 1000.0).abs() < 0.01));
    assert!(readings.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_not_ready_ticks_are_skipped() {
    let meter = LcrMeter::new(fast_settings());
    let simulator = SimulatedMeter::with_seed(2);
    let device = simulator.handle();
    device.set_not_ready(true);
    assert!(meter.connect_channel("simulator", Box::new(simulator)).success);

    let cancel = CancellationToken::new();
    let handle = meter.spawn_poller(cancel.clone());
    meter.start_measurement();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(meter.feed().is_empty());

    device.set_not_ready(false);
    wait_for_len(&meter, 3).await;

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frequency_update_reaches_readings() {
    let meter = LcrMeter::new(fast_settings());
    let simulator = SimulatedMeter::with_seed(3);
    let device = simulator.handle();
    assert!(meter.connect_channel("simulator", Box::new(simulator)).success);

    let mut fields = serde_json::Map::new();
    fields.insert("frequency".to_string(), serde_json::json!(10000));
    let config = meter.set_config(&ConfigUpdate::from_json(&fields));
    assert_eq!(config.frequency, 10000);
    assert!((device.snapshot().frequency_hz - 10000.0).abs() < 0.01);

    let cancel = CancellationToken::new();
    let handle = meter.spawn_poller(cancel.clone());
    meter.start_measurement();
    wait_for_len(&meter, 1).await;
    meter.stop_measurement();

    let latest = meter.list_measurements(1);
    assert!((latest[0].frequency - 10000.0).abs() < 0.01);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_while_polling_keeps_loop_alive() {
    let meter = LcrMeter::new(fast_settings());
    assert!(meter.connect_channel("simulator", Box::new(SimulatedMeter::with_seed(4))).success);

    let cancel = CancellationToken::new();
    let handle = meter.spawn_poller(cancel.clone());
    meter.start_measurement();
    wait_for_len(&meter, 2).await;

    meter.disconnect();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let settled = meter.feed().len();

    assert!(meter.connect_channel("simulator", Box::new(SimulatedMeter::with_seed(5))).success);
    wait_for_len(&meter, settled + 2).await;

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_frequency_keeps_local_config() {
    let meter = LcrMeter::new(fast_settings());
    assert!(meter.connect_channel("unreliable", Box::new(Unreliable::new(0))).success);

    let mut fields = serde_json::Map::new();
    fields.insert("frequency".to_string(), serde_json::json!(5000));
    assert_eq!(meter.set_config(&ConfigUpdate::from_json(&fields)).frequency, 5000);
    assert_eq!(meter.get_config().frequency, 5000);
    assert!(meter.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbage_replies_do_not_stop_polling() {
    let meter = LcrMeter::new(fast_settings());
    assert!(meter.connect_channel("unreliable", Box::new(Unreliable::new(8))).success);

    let cancel = CancellationToken::new();
    let handle = meter.spawn_poller(cancel.clone());
    meter.start_measurement();

    wait_for_len(&meter, 3).await;
    // The device never accepted a frequency change
    assert!(meter
        .list_measurements(3)
        .iter()
        .all(|m| (m.frequency - 1000.0).abs() < 0.01));
    assert!(!handle.is_finished());

    cancel.cancel();
    handle.await.unwrap();
}
