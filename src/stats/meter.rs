// src/stats/meter.rs
//! Hash-rate accounting
//!
//! Lanes bump an atomic counter after every hash. Readers turn the counter
//! into a rate over a sliding window of samples taken at read time, so the
//! hot path never takes a lock.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sliding-window hash-rate meter
pub struct HashRateMeter {
    total: AtomicU64,
    window: Duration,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl HashRateMeter {
    /// Creates a meter averaging over `window`
    pub fn new(window: Duration) -> Self {
        let mut samples = VecDeque::new();
        samples.push_back((Instant::now(), 0));
        HashRateMeter {
            total: AtomicU64::new(0),
            window: window.max(Duration::from_millis(100)),
            samples: Mutex::new(samples),
        }
    }

    /// Records completed hashes
    pub fn record(&self, hashes: u64) {
        self.total.fetch_add(hashes, Ordering::Relaxed);
    }

    /// Hashes recorded since creation
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Current rate in hashes per second
    ///
    /// Averages over the samples within the window; until the window has
    /// filled, averages since creation.
    pub fn rate(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let total = self.total();
        let Ok(mut samples) = self.samples.lock() else {
            return 0.0;
        };

        samples.push_back((now, total));
        // Keep the newest sample that is at least one window old as the base
        while samples.len() > 2 && now.duration_since(samples[1].0) >= self.window {
            samples.pop_front();
        }

        let (since, base) = samples[0];
        let elapsed = now.duration_since(since).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        total.saturating_sub(base) as f64 / elapsed
    }

}

impl Default for HashRateMeter {
    fn default() -> Self {
        HashRateMeter::new(Duration::from_secs(10))
    }
}
