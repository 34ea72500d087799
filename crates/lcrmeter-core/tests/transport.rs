//! Transport serialization under concurrent callers

use lcrmeter_core::protocol::{CommunicationChannel, ConnectionConfig, Transport};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Answers the most recently written request, after a delay.
///
/// If two exchanges were allowed to overlap, the first caller's read would
/// see the second caller's response.
struct DelayedEcho {
    last_request: Vec<u8>,
    pending: Vec<u8>,
    delay: Duration,
}

impl DelayedEcho {
    fn new(delay: Duration) -> Self {
        Self {
            last_request: Vec::new(),
            pending: Vec::new(),
            delay,
        }
    }
}

impl Read for DelayedEcho {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            thread::sleep(self.delay);
            // Name/id style answer: header plus four bytes derived from the opcode
            let opcode = self.last_request.get(1).copied().unwrap_or(0);
            self.pending = vec![0xAA, opcode, opcode, opcode, opcode, opcode];
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for DelayedEcho {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.last_request = buf.to_vec();
        self.pending.clear();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for DelayedEcho {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}

#[test]
fn test_concurrent_exchanges_never_interleave() {
    let transport = Arc::new(Transport::new(ConnectionConfig {
        baud_rate: 9600,
        timeout_ms: 1000,
    }));
    transport
        .attach("echo", Box::new(DelayedEcho::new(Duration::from_millis(2))))
        .unwrap();

    let workers: Vec<_> = [64u8, 65, 66, 72]
        .into_iter()
        .map(|opcode| {
            let transport = transport.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let response = transport.exchange(&[0xAA, opcode], 6).unwrap();
                    assert_eq!(response, vec![0xAA, opcode, opcode, opcode, opcode, opcode]);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker saw an interleaved response");
    }

    let (tx, rx) = transport.get_counters();
    assert_eq!(tx, 4 * 25 * 2);
    assert_eq!(rx, 4 * 25 * 6);
}

#[test]
fn test_close_waits_for_in_flight_exchange() {
    let transport = Arc::new(Transport::default());
    transport
        .attach("echo", Box::new(DelayedEcho::new(Duration::from_millis(50))))
        .unwrap();

    let busy = {
        let transport = transport.clone();
        thread::spawn(move || transport.exchange(&[0xAA, 64], 6))
    };
    thread::sleep(Duration::from_millis(10));
    transport.close();

    let response = busy.join().unwrap().unwrap();
    assert_eq!(response.len(), 6);
    assert!(!transport.is_open());
}

#[test]
fn test_reattach_replaces_connection() {
    let transport = Transport::default();
    transport
        .attach("first", Box::new(DelayedEcho::new(Duration::ZERO)))
        .unwrap();
    transport
        .attach("second", Box::new(DelayedEcho::new(Duration::ZERO)))
        .unwrap();
    assert_eq!(transport.port_name().as_deref(), Some("second"));
}
