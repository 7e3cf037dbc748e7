// src/coordinator/session.rs
//! A running mining session
//!
//! Created by `MiningCoordinator::start`, torn down by `stop`. The session owns
//! the tokio runtime that drives the pool connections, one [`WorkerSlot`] per
//! worker, the event dispatcher and the optional stats reporter.
//!
//! Teardown order matters: lanes stop first so every share they found is on
//! its channel, then connections flush those shares and close, then the
//! runtime goes, and the dispatcher closes last so every event emitted along
//! the way is still delivered.

use crate::config::Worker;
use crate::coordinator::events::{Dispatcher, EventBus};
use crate::coordinator::slot::WorkerSlot;
use crate::miner::algorithm::Algorithm;
use crate::miner::capacity::{Allocation, CapacityLimits, DeviceInventory, allocate};
use crate::miner::engine::HashEngine;
use crate::miner::job::Share;
use crate::network::connection::{ConnectionExit, ConnectionSettings, PoolConnection};
use crate::network::connector::PoolConnector;
use crate::stats::{HashRateMeter, MiningStats, ReporterHandle, StatsReporter, StatsSource};
use crate::utils::error::MinerError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long runtime shutdown waits for stray blocking tasks
const RUNTIME_GRACE: Duration = Duration::from_secs(2);

/// Everything a session needs besides the workers
pub struct SessionParams {
    /// Opens pool links
    pub connector: Arc<dyn PoolConnector>,
    /// Hashing backend shared by all workers
    pub algorithm: Arc<dyn Algorithm>,
    /// Capacity limits to split
    pub limits: CapacityLimits,
    /// Machine inventory
    pub inventory: DeviceInventory,
    /// Nonces per work unit
    pub batch_size: u32,
    /// Rejections that stop a worker
    pub reject_threshold: u64,
    /// Connection timing
    pub connection: ConnectionSettings,
    /// Hash-rate averaging window
    pub hashrate_window: Duration,
    /// Stats log interval, if any
    pub report_interval: Option<Duration>,
    /// Tokio worker threads for pool I/O
    pub io_threads: usize,
}

/// State shared between the session owner and its connection tasks
pub(crate) struct SessionCore {
    slots: Vec<Arc<WorkerSlot>>,
    limits: CapacityLimits,
    active: AtomicBool,
    rebalance: Mutex<()>,
    started: Instant,
}

impl SessionCore {
    /// Takes a fatally failed worker out and hands its capacity to the rest
    fn retire(&self, slot: &WorkerSlot, error: MinerError) {
        log::error!("Worker '{}' stopped: {}", slot.id(), error);
        slot.report_fatal(error);
        if !slot.retire() {
            return;
        }

        let Ok(_guard) = self.rebalance.lock() else {
            return;
        };
        let live: Vec<&Arc<WorkerSlot>> = self.slots.iter().filter(|s| s.is_live()).collect();
        if live.is_empty() {
            log::warn!("No workers left; session is inactive");
            self.active.store(false, Ordering::SeqCst);
            return;
        }

        let weights: Vec<f64> = live.iter().map(|s| s.worker().weight).collect();
        for (survivor, allocation) in live.iter().zip(allocate(&self.limits, &weights)) {
            if let Err(e) = survivor.reallocate(allocation) {
                log::warn!("Worker '{}': reallocation failed: {}", survivor.id(), e);
            }
        }
    }

    fn hash_rate(&self) -> f64 {
        self.slots.iter().map(|slot| slot.hash_rate()).sum()
    }
}

impl StatsSource for SessionCore {
    fn mining_stats(&self) -> MiningStats {
        let mut stats = MiningStats {
            uptime: self.started.elapsed(),
            workers_total: self.slots.len(),
            ..MiningStats::default()
        };
        for slot in &self.slots {
            let snapshot = slot.stats();
            stats.hash_rate += snapshot.hash_rate;
            stats.hashes_total += snapshot.hashes;
            stats.shares_accepted += snapshot.accepted;
            stats.shares_rejected += snapshot.rejected;
            stats.workers_live += usize::from(snapshot.live);
        }
        stats
    }
}

struct Teardown {
    runtime: Runtime,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    reporter: Option<ReporterHandle>,
}

impl Teardown {
    fn finish(self, slots: &[Arc<WorkerSlot>]) {
        for slot in slots {
            slot.engine().stop();
        }

        let _ = self.shutdown.send(true);
        let tasks = self.tasks;
        self.runtime.block_on(async move {
            for task in tasks {
                if let Err(e) = task.await {
                    log::error!("Connection task failed: {}", e);
                }
            }
        });
        self.runtime.shutdown_timeout(RUNTIME_GRACE);

        if let Some(reporter) = self.reporter {
            reporter.stop();
        }
    }
}

/// Runtime state of an active coordinator
pub struct MiningSession {
    core: Arc<SessionCore>,
    teardown: Mutex<Option<Teardown>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl MiningSession {
    /// Builds all workers and starts mining
    ///
    /// # Errors
    /// `MinerError::IoError` if the runtime or a thread cannot be created;
    /// nothing is left running on error.
    pub fn start(
        workers: &[Worker],
        params: SessionParams,
        bus: Arc<EventBus>,
    ) -> Result<Self, MinerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(params.io_threads.max(1))
            .thread_name("pool-io")
            .enable_all()
            .build()?;
        let dispatcher = Dispatcher::spawn(bus)?;

        let weights: Vec<f64> = workers.iter().map(|w| w.weight).collect();
        let allocations = allocate(&params.limits, &weights);

        let mut slots = Vec::with_capacity(workers.len());
        let mut receivers = Vec::with_capacity(workers.len());
        for (worker, allocation) in workers.iter().zip(allocations) {
            let meter = Arc::new(HashRateMeter::new(params.hashrate_window));
            let (share_tx, share_rx) = tokio::sync::mpsc::unbounded_channel();
            let engine = Arc::new(HashEngine::new(
                worker.identifier.clone(),
                worker.nicehash,
                Arc::clone(&params.algorithm),
                params.inventory,
                params.batch_size,
                Arc::clone(&meter),
                share_tx,
            ));
            slots.push(Arc::new(WorkerSlot::new(
                worker.clone(),
                engine,
                meter,
                allocation,
                params.reject_threshold,
                dispatcher.sink(),
            )));
            receivers.push(share_rx);
        }

        let core = Arc::new(SessionCore {
            slots,
            limits: params.limits,
            active: AtomicBool::new(true),
            rebalance: Mutex::new(()),
            started: Instant::now(),
        });

        let abort = |core: &SessionCore, dispatcher: Dispatcher, error: MinerError| {
            for slot in &core.slots {
                slot.engine().stop();
            }
            dispatcher.close();
            error
        };

        for slot in &core.slots {
            if let Err(e) = slot.engine().start(slot.allocation()) {
                return Err(abort(&core, dispatcher, e));
            }
        }

        let reporter = match params.report_interval {
            Some(interval) => {
                let source: Arc<dyn StatsSource> = core.clone();
                match StatsReporter::new(interval).spawn(source) {
                    Ok(handle) => Some(handle),
                    Err(e) => return Err(abort(&core, dispatcher, e)),
                }
            }
            None => None,
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = core
            .slots
            .iter()
            .zip(receivers)
            .map(|(slot, shares)| {
                let connection = PoolConnection::new(
                    slot.worker().clone(),
                    Arc::clone(&params.connector),
                    Arc::clone(slot.engine()),
                    slot.clone(),
                    params.connection.clone(),
                );
                runtime.spawn(supervise(
                    connection,
                    Arc::clone(slot),
                    Arc::clone(&core),
                    shares,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        log::info!("Mining session started with {} worker(s)", core.slots.len());
        Ok(MiningSession {
            core,
            teardown: Mutex::new(Some(Teardown {
                runtime,
                shutdown,
                tasks,
                reporter,
            })),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// True while at least one worker is mining and stop wasn't called
    pub fn is_active(&self) -> bool {
        self.core.active.load(Ordering::SeqCst)
    }

    /// Sum of the workers' hash rates
    pub fn hash_rate(&self) -> f64 {
        self.core.hash_rate()
    }

    /// Slots in configuration order
    pub fn slots(&self) -> &[Arc<WorkerSlot>] {
        &self.core.slots
    }

    /// Slot of a worker
    pub fn slot(&self, worker_id: &str) -> Option<&Arc<WorkerSlot>> {
        self.core.slots.iter().find(|slot| slot.id() == worker_id)
    }

    /// Current capacity split
    pub fn allocations(&self) -> Vec<(String, Allocation)> {
        self.core
            .slots
            .iter()
            .map(|slot| (slot.id().to_string(), slot.allocation()))
            .collect()
    }

    /// Session-wide statistics
    pub fn stats(&self) -> MiningStats {
        self.core.mining_stats()
    }

    /// Stops everything; later calls do nothing
    ///
    /// Blocks until lanes, connections and the runtime are gone. The
    /// blocking part runs on a scoped helper thread so this may be called
    /// from inside another async runtime or from an event callback.
    pub fn shutdown(&self) {
        self.core.active.store(false, Ordering::SeqCst);

        let teardown = self.teardown.lock().ok().and_then(|mut t| t.take());
        if let Some(teardown) = teardown {
            let slots = &self.core.slots;
            std::thread::scope(|scope| {
                let helper = std::thread::Builder::new()
                    .name("session-teardown".into())
                    .spawn_scoped(scope, move || teardown.finish(slots));
                match helper {
                    Ok(handle) => {
                        if handle.join().is_err() {
                            log::error!("Session teardown panicked");
                        }
                    }
                    Err(e) => log::error!("Cannot spawn teardown thread: {}", e),
                }
            });
            log::info!("Mining session stopped");
        }

        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(dispatcher) = dispatcher {
            dispatcher.close();
        }
    }
}

impl Drop for MiningSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs one connection and retires its worker on a fatal exit
async fn supervise(
    connection: PoolConnection,
    slot: Arc<WorkerSlot>,
    core: Arc<SessionCore>,
    shares: UnboundedReceiver<Share>,
    shutdown: watch::Receiver<bool>,
) {
    match connection.run(shares, shutdown).await {
        ConnectionExit::Shutdown => {}
        ConnectionExit::Fatal(error) => {
            // Stopping the engine joins lane threads
            let retired =
                tokio::task::spawn_blocking(move || core.retire(&slot, error)).await;
            if let Err(e) = retired {
                log::error!("Retiring worker failed: {}", e);
            }
        }
    }
}
