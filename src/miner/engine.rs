// src/miner/engine.rs
//! Hash engine: lanes hashing work units against the current job
//!
//! One engine serves one worker. It turns a capacity [`Allocation`] into lanes
//! (OS threads) per device kind. Every lane pulls [`WorkUnit`]s from a shared
//! [`WorkStream`]: an endless, restartable sequence of nonce batches over
//! whatever job is installed. Found shares go out on an unbounded channel;
//! completed hashes go into the worker's [`HashRateMeter`].
//!
//! Lanes only look at the plan between units. A reallocation therefore never
//! cuts a unit short: surplus lanes retire after finishing their unit, kept
//! lanes pick up the new duty cycle on their next unit. Stopping is different:
//! the stop flag is checked between hashes.

use crate::miner::algorithm::Algorithm;
use crate::miner::capacity::{Allocation, DeviceInventory, EnginePlan};
use crate::miner::job::{MiningJob, Share, meets_target};
use crate::stats::HashRateMeter;
use crate::types::LaneKind;
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// How long an idle lane sleeps between checks for a job
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Pause after a hashing error so a broken backend doesn't spin a core
const ERROR_PAUSE: Duration = Duration::from_millis(500);

/// A contiguous batch of nonces for one job
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Job the nonces belong to
    pub job: Arc<MiningJob>,
    /// First counter value of the batch
    pub first_counter: u32,
    /// Number of nonces in the batch
    pub count: u32,
}

impl WorkUnit {
    /// Counter values covered by this unit (wrapping at `u32::MAX`)
    pub fn counters(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.count).map(move |i| self.first_counter.wrapping_add(i))
    }
}

/// Lazy, endless sequence of work units over the current job
///
/// Yields `None` only while no job is installed. Installing a job rewinds
/// the sequence to the start of the nonce space.
pub struct WorkStream {
    shared: Arc<EngineShared>,
}

impl Iterator for WorkStream {
    type Item = WorkUnit;

    fn next(&mut self) -> Option<WorkUnit> {
        let job = self.shared.current_job.load_full()?;
        let batch = self.shared.batch_size;
        let first_counter = self.shared.nonce_counter.fetch_add(batch, Ordering::SeqCst);
        Some(WorkUnit {
            job,
            first_counter,
            count: batch,
        })
    }
}

#[derive(Default)]
struct Roster {
    plan: EnginePlan,
    active: HashMap<(LaneKind, usize), JoinHandle<()>>,
    retired: Vec<JoinHandle<()>>,
}

struct EngineShared {
    worker_id: String,
    nicehash: bool,
    batch_size: u32,
    algorithm: Arc<dyn Algorithm>,
    current_job: ArcSwapOption<MiningJob>,
    nonce_counter: AtomicU32,
    stop: AtomicBool,
    completed_units: AtomicU64,
    roster: Mutex<Roster>,
    meter: Arc<HashRateMeter>,
    shares: UnboundedSender<Share>,
}

impl EngineShared {
    fn roster(&self) -> Result<MutexGuard<'_, Roster>, MinerError> {
        self.roster
            .lock()
            .map_err(|_| MinerError::TaskError("Lane roster lock poisoned".into()))
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sleeps up to `duration`, waking early on stop
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(IDLE_POLL));
        }
    }
}

/// Hashing engine for one worker
pub struct HashEngine {
    inventory: DeviceInventory,
    shared: Arc<EngineShared>,
}

impl HashEngine {
    /// Creates an engine with no lanes running
    ///
    /// # Arguments
    /// * `worker_id` - Worker the found shares are attributed to
    /// * `nicehash` - Preserve the pool's top nonce byte
    /// * `algorithm` - Hashing backend shared by all lanes
    /// * `inventory` - Compute units of the machine
    /// * `batch_size` - Nonces per work unit
    /// * `meter` - Receives completed hash counts
    /// * `shares` - Receives found shares
    pub fn new(
        worker_id: impl Into<String>,
        nicehash: bool,
        algorithm: Arc<dyn Algorithm>,
        inventory: DeviceInventory,
        batch_size: u32,
        meter: Arc<HashRateMeter>,
        shares: UnboundedSender<Share>,
    ) -> Self {
        HashEngine {
            inventory,
            shared: Arc::new(EngineShared {
                worker_id: worker_id.into(),
                nicehash,
                batch_size: batch_size.max(1),
                algorithm,
                current_job: ArcSwapOption::empty(),
                nonce_counter: AtomicU32::new(0),
                stop: AtomicBool::new(false),
                completed_units: AtomicU64::new(0),
                roster: Mutex::new(Roster::default()),
                meter,
                shares,
            }),
        }
    }

    /// Starts lanes for the given allocation
    pub fn start(&self, allocation: Allocation) -> Result<(), MinerError> {
        self.reallocate(allocation)
    }

    /// Applies a new allocation while mining
    ///
    /// Missing lanes are spawned immediately. Surplus lanes finish their
    /// current unit and then retire.
    ///
    /// # Errors
    /// `MinerError::StateError` after [`HashEngine::stop`], or `IoError` if a
    /// lane thread cannot be spawned.
    pub fn reallocate(&self, allocation: Allocation) -> Result<(), MinerError> {
        if self.shared.stopped() {
            return Err(MinerError::StateError(format!(
                "Engine for '{}' is stopped",
                self.shared.worker_id
            )));
        }

        let plan = EnginePlan::new(allocation, &self.inventory);
        let mut roster = self.shared.roster()?;
        roster.plan = plan;
        roster.retired.retain(|handle| !handle.is_finished());

        for kind in [LaneKind::Cpu, LaneKind::Accelerator] {
            for index in 0..plan.lanes(kind).lanes {
                if roster.active.contains_key(&(kind, index)) {
                    continue;
                }
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name(format!("{}-{}{}", self.shared.worker_id, kind, index))
                    .spawn(move || Lane { shared, kind, index }.run())?;
                roster.active.insert((kind, index), handle);
            }
        }

        log::info!(
            "Worker '{}': {} cpu lane(s) at {:.0}% duty, {} accelerator lane(s) at {:.0}% duty",
            self.shared.worker_id,
            plan.cpu.lanes,
            plan.cpu.duty * 100.0,
            plan.accelerator.lanes,
            plan.accelerator.duty * 100.0
        );
        Ok(())
    }

    /// Installs a new job and rewinds the nonce sequence
    ///
    /// Runs [`Algorithm::prepare`] first, which may block for a while.
    pub fn update_job(&self, job: MiningJob) -> Result<(), MinerError> {
        self.shared.algorithm.prepare(&job)?;

        let expected = self.shared.algorithm.algorithm_type();
        if let Some(announced) = job.algorithm.filter(|a| *a != expected) {
            log::warn!(
                "Worker '{}': pool announced {} for job {}, hashing with {}",
                self.shared.worker_id,
                announced,
                job.job_id,
                expected
            );
        }

        log::debug!(
            "Worker '{}': new job {} (difficulty {})",
            self.shared.worker_id,
            job.job_id,
            job.difficulty()
        );
        self.shared.current_job.store(Some(Arc::new(job)));
        self.shared.nonce_counter.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Drops the current job; lanes idle until a new one arrives
    pub fn clear_job(&self) {
        self.shared.current_job.store(None);
    }

    /// Currently installed job
    pub fn current_job(&self) -> Option<Arc<MiningJob>> {
        self.shared.current_job.load_full()
    }

    /// A work stream over this engine's current job
    pub fn work_stream(&self) -> WorkStream {
        WorkStream {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current lane plan
    pub fn plan(&self) -> EnginePlan {
        self.shared
            .roster()
            .map(|roster| roster.plan)
            .unwrap_or_default()
    }

    /// Number of lanes of `kind` that have not retired
    pub fn active_lanes(&self, kind: LaneKind) -> usize {
        self.shared
            .roster()
            .map(|roster| roster.active.keys().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    /// Work units hashed to completion
    pub fn completed_units(&self) -> u64 {
        self.shared.completed_units.load(Ordering::Relaxed)
    }

    /// Signals every lane to stop at its next checkpoint and joins them
    ///
    /// Idempotent. Shares found before the checkpoint are already on the
    /// share channel when this returns.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = match self.shared.roster() {
            Ok(mut roster) => {
                let mut handles: Vec<_> = roster.active.drain().map(|(_, h)| h).collect();
                handles.append(&mut roster.retired);
                handles
            }
            Err(e) => {
                log::error!("Worker '{}': {}", self.shared.worker_id, e);
                Vec::new()
            }
        };

        for handle in handles {
            if handle.join().is_err() {
                log::error!("Worker '{}': a lane panicked", self.shared.worker_id);
            }
        }
    }
}

impl Drop for HashEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Lane {
    shared: Arc<EngineShared>,
    kind: LaneKind,
    index: usize,
}

impl Lane {
    fn run(self) {
        log::debug!("Lane {}{} started", self.kind, self.index);
        let mut stream = WorkStream {
            shared: Arc::clone(&self.shared),
        };
        let mut buf = Vec::new();

        while let Some(duty) = self.checkpoint() {
            let Some(unit) = stream.next() else {
                self.shared.idle(IDLE_POLL);
                continue;
            };

            let started = Instant::now();
            if !self.hash_unit(&unit, &mut buf) {
                break;
            }

            if duty > 0.0 && duty < 1.0 {
                let busy = started.elapsed();
                self.shared.idle(busy.mul_f64((1.0 - duty) / duty));
            }
        }
        log::debug!("Lane {}{} exited", self.kind, self.index);
    }

    /// Unit boundary: returns the duty cycle to run at, or `None` to exit
    fn checkpoint(&self) -> Option<f64> {
        if self.shared.stopped() {
            return None;
        }
        let mut roster = self.shared.roster().ok()?;
        let plan = roster.plan.lanes(self.kind);
        if self.index >= plan.lanes {
            if let Some(handle) = roster.active.remove(&(self.kind, self.index)) {
                roster.retired.push(handle);
            }
            return None;
        }
        Some(plan.duty)
    }

    /// Hashes one unit; `false` if stopped part-way
    fn hash_unit(&self, unit: &WorkUnit, buf: &mut Vec<u8>) -> bool {
        let shared = &self.shared;
        buf.clear();
        buf.extend_from_slice(&unit.job.blob);

        for counter in unit.counters() {
            if shared.stopped() {
                return false;
            }
            let nonce = unit.job.nonce_for(counter, shared.nicehash);
            MiningJob::write_nonce(buf, nonce);

            match shared.algorithm.hash_job(&unit.job, buf) {
                Ok(hash) => {
                    shared.meter.record(1);
                    if meets_target(&hash, unit.job.target) {
                        let _ = shared.shares.send(Share {
                            worker_id: shared.worker_id.clone(),
                            job_id: unit.job.job_id.clone(),
                            nonce,
                            result: hash,
                        });
                    }
                }
                Err(e) => {
                    log::error!("Hashing failed: {}", e);
                    shared.idle(ERROR_PAUSE);
                    return !shared.stopped();
                }
            }
        }

        shared.completed_units.fetch_add(1, Ordering::Relaxed);
        true
    }
}
