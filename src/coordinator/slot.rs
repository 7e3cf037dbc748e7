// src/coordinator/slot.rs
//! One worker inside a running session
//!
//! A [`WorkerSlot`] ties a worker's [`HashEngine`] and hash-rate meter to the
//! events its pool connection produces: it keeps the per-session counters and
//! turns connection callbacks into [`MiningEvent`]s.

use crate::config::Worker;
use crate::coordinator::events::{EventSink, MiningEvent};
use crate::miner::capacity::Allocation;
use crate::miner::engine::HashEngine;
use crate::miner::job::Share;
use crate::network::connection::{ConnectionObserver, ConnectionState, Verdict};
use crate::stats::HashRateMeter;
use crate::utils::error::MinerError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Snapshot of one worker's counters
#[derive(Debug, Clone, PartialEq)]
pub struct SlotStats {
    /// Worker identifier
    pub worker_id: String,
    /// Current hash rate (H/s)
    pub hash_rate: f64,
    /// Hashes computed this session
    pub hashes: u64,
    /// Accepted shares this session
    pub accepted: u64,
    /// Rejected shares this session
    pub rejected: u64,
    /// Current share difficulty, once a job arrived
    pub difficulty: Option<u64>,
    /// Connection state
    pub state: ConnectionState,
    /// Capacity currently assigned
    pub allocation: Allocation,
    /// False once the worker stopped for good
    pub live: bool,
}

/// A worker bound to its share of the machine
pub struct WorkerSlot {
    worker: Worker,
    engine: Arc<HashEngine>,
    meter: Arc<HashRateMeter>,
    allocation: Mutex<Allocation>,
    state: Mutex<ConnectionState>,
    difficulty: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    reject_threshold: u64,
    live: AtomicBool,
    events: EventSink,
}

impl WorkerSlot {
    /// Creates a slot; the engine is started separately
    ///
    /// # Arguments
    /// * `reject_threshold` - Rejections that stop the worker (at least 1)
    pub fn new(
        worker: Worker,
        engine: Arc<HashEngine>,
        meter: Arc<HashRateMeter>,
        allocation: Allocation,
        reject_threshold: u64,
        events: EventSink,
    ) -> Self {
        WorkerSlot {
            worker,
            engine,
            meter,
            allocation: Mutex::new(allocation),
            state: Mutex::new(ConnectionState::Disconnected),
            difficulty: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            reject_threshold: reject_threshold.max(1),
            live: AtomicBool::new(true),
            events,
        }
    }

    /// The worker this slot mines for
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Worker identifier
    pub fn id(&self) -> &str {
        &self.worker.identifier
    }

    /// The worker's engine
    pub fn engine(&self) -> &Arc<HashEngine> {
        &self.engine
    }

    /// Current hash rate; 0 once the worker stopped
    pub fn hash_rate(&self) -> f64 {
        if self.is_live() {
            self.meter.rate()
        } else {
            0.0
        }
    }

    /// Current share difficulty
    pub fn difficulty(&self) -> Option<u64> {
        match self.difficulty.load(Ordering::Relaxed) {
            0 => None,
            difficulty => Some(difficulty),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Capacity currently assigned
    pub fn allocation(&self) -> Allocation {
        self.allocation
            .lock()
            .map(|allocation| *allocation)
            .unwrap_or_default()
    }

    /// False once the worker stopped for the rest of the session
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Applies a new capacity share to the engine
    pub fn reallocate(&self, allocation: Allocation) -> Result<(), MinerError> {
        self.engine.reallocate(allocation)?;
        if let Ok(mut current) = self.allocation.lock() {
            *current = allocation;
        }
        Ok(())
    }

    /// Takes the worker out of the session and stops its lanes
    ///
    /// Returns `false` if it was already retired. Blocks while lanes finish.
    pub fn retire(&self) -> bool {
        if !self.live.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.engine.stop();
        if let Ok(mut current) = self.allocation.lock() {
            *current = Allocation::default();
        }
        true
    }

    /// Counter snapshot
    pub fn stats(&self) -> SlotStats {
        SlotStats {
            worker_id: self.worker.identifier.clone(),
            hash_rate: self.hash_rate(),
            hashes: self.meter.total(),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            difficulty: self.difficulty(),
            state: self.state(),
            allocation: self.allocation(),
            live: self.is_live(),
        }
    }

    fn error(&self, error: MinerError, stopped: bool) {
        self.events.emit(MiningEvent::MiningError {
            worker_id: self.worker.identifier.clone(),
            error: Arc::new(error),
            stopped,
        });
    }

    /// Reports the error that ended this worker
    pub fn report_fatal(&self, error: MinerError) {
        self.error(error, true);
    }
}

impl ConnectionObserver for WorkerSlot {
    fn state_changed(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            if *current != state {
                log::debug!("Worker '{}': {} -> {}", self.id(), *current, state);
                *current = state;
            }
        }
    }

    fn job_received(&self, job_id: &str, difficulty: u64) {
        let previous = self.difficulty.swap(difficulty, Ordering::Relaxed);
        if previous != difficulty {
            log::info!(
                "Worker '{}': difficulty {} (job {})",
                self.id(),
                difficulty,
                job_id
            );
            self.events.emit(MiningEvent::DifficultyChanged {
                difficulty,
                worker_id: self.worker.identifier.clone(),
            });
        }
    }

    fn share_accepted(&self, _share: &Share) {
        let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        self.events.emit(MiningEvent::AcceptedResult {
            count,
            worker_id: self.worker.identifier.clone(),
        });
    }

    fn share_rejected(&self, share: &Share, reason: &str) -> Verdict {
        let count = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.reject_threshold {
            // The connection reports the fatal error once it has wound down
            return Verdict::Stop;
        }
        self.error(
            MinerError::ShareRejectedError(format!(
                "{} (job {}, {}/{} rejections)",
                reason, share.job_id, count, self.reject_threshold
            )),
            false,
        );
        Verdict::Continue
    }

    fn block_found(&self) {
        self.events.emit(MiningEvent::BlockFound {
            worker_id: self.worker.identifier.clone(),
        });
    }

    fn transient_error(&self, error: MinerError) {
        self.error(error, false);
    }
}
