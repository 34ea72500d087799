//! Measurement feed
//!
//! Bounded in-memory ring of recent measurements, written by the polling loop
//! and read by any number of request handlers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::DEFAULT_FEED_CAPACITY;
use crate::measurement::Measurement;

/// Ring of the most recent measurements, oldest first.
///
/// The lock is held only while the container is mutated or copied, never
/// across device I/O.
#[derive(Debug)]
pub struct MeasurementFeed {
    entries: Mutex<VecDeque<Measurement>>,
    capacity: usize,
}

impl MeasurementFeed {
    /// Create a feed retaining at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Measurement>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a measurement, evicting the oldest once over capacity
    pub fn push(&self, measurement: Measurement) {
        let mut entries = self.lock();
        entries.push_back(measurement);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The most recent `limit` entries, oldest first
    pub fn snapshot(&self, limit: usize) -> Vec<Measurement> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Every retained entry, oldest first
    pub fn all(&self) -> Vec<Measurement> {
        self.lock().iter().cloned().collect()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the feed holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for MeasurementFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{decode_at, MeasurementFrame};
    use chrono::Local;

    fn reading(range: u8) -> Measurement {
        let frame = MeasurementFrame {
            flags: 0x80,
            mode: 2,
            speed: 1,
            range,
            reserved: [0; 4],
            frequency_raw: 100_000,
            impedance: 100.0,
            phase: 0.0,
        };
        decode_at(&frame.to_bytes(), Local::now()).unwrap()
    }

    #[test]
    fn test_snapshot_limit() {
        let feed = MeasurementFeed::new(10);
        for i in 0..5 {
            feed.push(reading(i));
        }
        let ranges: Vec<u8> = feed.snapshot(3).iter().map(|m| m.range).collect();
        assert_eq!(ranges, vec![2, 3, 4]);
        assert_eq!(feed.snapshot(100).len(), 5);
        assert!(feed.snapshot(0).is_empty());
        assert_eq!(feed.len(), 5);
    }

    #[test]
    fn test_clear() {
        let feed = MeasurementFeed::new(10);
        feed.push(reading(1));
        feed.clear();
        assert!(feed.is_empty());
        feed.push(reading(2));
        assert_eq!(feed.all()[0].range, 2);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let feed = MeasurementFeed::new(0);
        feed.push(reading(1));
        feed.push(reading(2));
        assert_eq!(feed.capacity(), 1);
        assert_eq!(feed.all()[0].range, 2);
    }
}
