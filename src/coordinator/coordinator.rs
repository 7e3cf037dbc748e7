// src/coordinator/coordinator.rs
use crate::config::{Config, Worker, validate_workers};
use crate::coordinator::events::{EventBus, MinerDelegate, MiningEvent};
use crate::coordinator::session::{MiningSession, SessionParams};
use crate::miner::algorithm::{self, Algorithm};
use crate::miner::capacity::{Allocation, CapacityLimits, DeviceInventory, allocate};
use crate::network::connection::{ConnectionSettings, ConnectionState};
use crate::network::connector::PoolConnector;
use crate::network::stratum::StratumConnector;
use crate::stats::MiningStats;
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Engine and session tuning
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Nonces per work unit
    pub batch_size: u32,
    /// Compute units to spread lanes over
    pub inventory: DeviceInventory,
    /// Rejected shares that stop a worker
    pub reject_threshold: u64,
    /// Reconnect, keep-alive and flush timing
    pub connection: ConnectionSettings,
    /// Hash-rate averaging window
    pub hashrate_window: Duration,
    /// Log statistics at this interval while mining
    pub report_interval: Option<Duration>,
    /// Tokio worker threads for pool I/O
    pub io_threads: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            batch_size: 16,
            inventory: DeviceInventory::detect(0, 0),
            reject_threshold: 10,
            connection: ConnectionSettings::default(),
            hashrate_window: Duration::from_secs(10),
            report_interval: None,
            io_threads: 2,
        }
    }
}

#[derive(Default)]
struct Setup {
    workers: Vec<Worker>,
    limits: CapacityLimits,
}

/// Drives pool mining for a set of workers
///
/// Configure workers and capacity limits, then [`start`](Self::start). While
/// a session runs, results arrive through the [`MinerDelegate`] and
/// [`subscribe`](Self::subscribe) channels; only configuration and lifecycle
/// calls return errors.
///
/// All methods take `&self`; share the coordinator behind an `Arc` to stop it
/// from a callback or another thread.
pub struct MiningCoordinator {
    connector: Arc<dyn PoolConnector>,
    algorithm: Arc<dyn Algorithm>,
    options: CoordinatorOptions,
    setup: Mutex<Setup>,
    bus: Arc<EventBus>,
    lifecycle: Mutex<()>,
    session: ArcSwapOption<MiningSession>,
    /// Bumped by every `stop()`; lets `start()` notice a stop that raced it
    stops: AtomicU64,
}

impl MiningCoordinator {
    /// Creates an idle coordinator with no workers
    ///
    /// # Arguments
    /// * `connector` - Opens pool links (e.g. [`StratumConnector`])
    /// * `algorithm` - Hashing backend shared by all workers
    /// * `options` - Engine and session tuning
    pub fn new(
        connector: Arc<dyn PoolConnector>,
        algorithm: Arc<dyn Algorithm>,
        options: CoordinatorOptions,
    ) -> Self {
        MiningCoordinator {
            connector,
            algorithm,
            options,
            setup: Mutex::new(Setup::default()),
            bus: Arc::new(EventBus::default()),
            lifecycle: Mutex::new(()),
            session: ArcSwapOption::empty(),
            stops: AtomicU64::new(0),
        }
    }

    /// Builds a configured coordinator from a config file
    ///
    /// Uses the stratum connector and the configured algorithm.
    ///
    /// # Errors
    /// `MinerError::ConfigError` if the configuration is invalid
    pub fn from_config(config: &Config) -> Result<Self, MinerError> {
        config.validate()?;
        let coordinator = MiningCoordinator::new(
            Arc::new(
                StratumConnector::new(config.session.connect_timeout())
                    .with_transport(config.session.transport),
            ),
            algorithm::create(config.algorithm, config.engine.randomx_fast),
            config.coordinator_options(),
        );
        coordinator.configure(
            config.workers.clone(),
            config.limits.cpu_limit,
            config.limits.accelerator_limit,
        )?;
        Ok(coordinator)
    }

    fn setup(&self) -> Result<MutexGuard<'_, Setup>, MinerError> {
        self.setup
            .lock()
            .map_err(|_| MinerError::StateError("Coordinator setup lock poisoned".into()))
    }

    fn lifecycle(&self) -> Result<MutexGuard<'_, ()>, MinerError> {
        self.lifecycle
            .lock()
            .map_err(|_| MinerError::StateError("Coordinator lifecycle lock poisoned".into()))
    }

    fn ensure_inactive(&self, operation: &str) -> Result<(), MinerError> {
        if self.is_active() {
            return Err(MinerError::StateError(format!(
                "Cannot {} while mining is active",
                operation
            )));
        }
        Ok(())
    }

    /// Replaces the worker set and capacity limits
    ///
    /// # Errors
    /// - `MinerError::ConfigError` on duplicate/empty identifiers, weights
    ///   that are not positive, or limits outside `0..=1`
    /// - `MinerError::StateError` while mining is active
    pub fn configure(
        &self,
        workers: Vec<Worker>,
        cpu_limit: f64,
        accelerator_limit: f64,
    ) -> Result<(), MinerError> {
        let _lifecycle = self.lifecycle()?;
        self.ensure_inactive("configure")?;

        validate_workers(&workers)?;
        let limits = CapacityLimits::new(cpu_limit, accelerator_limit)?;

        let mut setup = self.setup()?;
        setup.workers = workers;
        setup.limits = limits;
        Ok(())
    }

    /// Changes only the capacity limits
    ///
    /// # Errors
    /// Same as [`configure`](Self::configure) for the limits part
    pub fn set_limits(&self, cpu_limit: f64, accelerator_limit: f64) -> Result<(), MinerError> {
        let _lifecycle = self.lifecycle()?;
        self.ensure_inactive("change limits")?;
        let limits = CapacityLimits::new(cpu_limit, accelerator_limit)?;
        self.setup()?.limits = limits;
        Ok(())
    }

    /// Starts mining for every configured worker
    ///
    /// # Errors
    /// - `MinerError::StateError` if already active
    /// - `MinerError::ConfigError` if no workers are configured
    /// - `MinerError::IoError` if threads or the runtime cannot be created
    pub fn start(&self) -> Result<(), MinerError> {
        let _lifecycle = self.lifecycle()?;
        self.ensure_inactive("start")?;
        let stops = self.stops.load(Ordering::SeqCst);

        // A session whose workers all failed is still holding its runtime
        if let Some(stale) = self.session.swap(None) {
            stale.shutdown();
        }

        let (workers, limits) = {
            let setup = self.setup()?;
            (setup.workers.clone(), setup.limits)
        };
        if workers.is_empty() {
            return Err(MinerError::ConfigError("No workers configured".into()));
        }

        let session =
            MiningSession::start(&workers, self.session_params(limits), Arc::clone(&self.bus))?;
        self.publish(session, stops);
        Ok(())
    }

    fn session_params(&self, limits: CapacityLimits) -> SessionParams {
        SessionParams {
            connector: Arc::clone(&self.connector),
            algorithm: Arc::clone(&self.algorithm),
            limits,
            inventory: self.options.inventory,
            batch_size: self.options.batch_size,
            reject_threshold: self.options.reject_threshold,
            connection: self.options.connection.clone(),
            hashrate_window: self.options.hashrate_window,
            report_interval: self.options.report_interval,
            io_threads: self.options.io_threads,
        }
    }

    /// Makes a freshly built session current
    ///
    /// `stops` is the stop count seen when the build began; a `stop()` that
    /// ran in the meantime found nothing to stop, so the session is torn
    /// down here instead.
    fn publish(&self, session: MiningSession, stops: u64) {
        self.session.store(Some(Arc::new(session)));
        if self.stops.load(Ordering::SeqCst) != stops {
            log::info!("Stop requested while starting; shutting the new session down");
            if let Some(session) = self.session.swap(None) {
                session.shutdown();
            }
        }
    }

    /// Stops mining: flushes in-flight shares, closes connections, joins
    /// lanes
    ///
    /// Idempotent. May be called from a delegate callback.
    pub fn stop(&self) {
        // Lock-free: callbacks may land here while another thread joins
        // their dispatcher
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.session.swap(None) {
            session.shutdown();
        }
    }

    /// True while a session has at least one live worker
    pub fn is_active(&self) -> bool {
        self.session
            .load()
            .as_ref()
            .is_some_and(|session| session.is_active())
    }

    /// Combined hash rate in H/s; `0.0` while inactive
    pub fn hash_rate(&self) -> f64 {
        match self.session.load().as_ref() {
            Some(session) if session.is_active() => session.hash_rate(),
            _ => 0.0,
        }
    }

    /// Current share difficulty of a worker
    pub fn difficulty(&self, worker_id: &str) -> Option<u64> {
        self.session
            .load()
            .as_ref()
            .and_then(|session| session.slot(worker_id).and_then(|slot| slot.difficulty()))
    }

    /// Connection state of a worker; `None` for unknown workers
    pub fn connection_state(&self, worker_id: &str) -> Option<ConnectionState> {
        if let Some(session) = self.session.load().as_ref() {
            return session.slot(worker_id).map(|slot| slot.state());
        }
        self.workers()
            .iter()
            .any(|w| w.identifier == worker_id)
            .then_some(ConnectionState::Disconnected)
    }

    /// Capacity per worker
    ///
    /// The live split while mining, the planned split otherwise.
    pub fn allocations(&self) -> Vec<(String, Allocation)> {
        if let Some(session) = self.session.load().as_ref() {
            return session.allocations();
        }
        let Ok(setup) = self.setup() else {
            return Vec::new();
        };
        let weights: Vec<f64> = setup.workers.iter().map(|w| w.weight).collect();
        setup
            .workers
            .iter()
            .map(|w| w.identifier.clone())
            .zip(allocate(&setup.limits, &weights))
            .collect()
    }

    /// Session statistics, while a session exists
    pub fn stats(&self) -> Option<MiningStats> {
        self.session.load().as_ref().map(|session| session.stats())
    }

    /// Installs (or with `None` removes) the delegate
    pub fn set_delegate(&self, delegate: Option<Arc<dyn MinerDelegate>>) {
        self.bus.set_delegate(delegate);
    }

    /// New event subscription
    pub fn subscribe(&self) -> Receiver<MiningEvent> {
        self.bus.subscribe()
    }

    /// Configured capacity limits
    pub fn limits(&self) -> CapacityLimits {
        self.setup()
            .map(|setup| setup.limits)
            .unwrap_or_default()
    }

    /// Configured workers
    pub fn workers(&self) -> Vec<Worker> {
        self.setup()
            .map(|setup| setup.workers.clone())
            .unwrap_or_default()
    }

    /// Options the coordinator was built with
    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }
}

impl Drop for MiningCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connector::PoolChannel;
    use crate::types::AlgorithmType;
    use futures::FutureExt;
    use futures::future::BoxFuture;

    struct Unreachable;

    impl PoolConnector for Unreachable {
        fn connect<'a>(
            &'a self,
            _worker: &'a Worker,
        ) -> BoxFuture<'a, Result<PoolChannel, MinerError>> {
            async { Err(MinerError::ConnectionError("unreachable".into())) }.boxed()
        }
    }

    struct Idle;

    impl Algorithm for Idle {
        fn hash(&self, _blob: &[u8]) -> Result<[u8; 32], MinerError> {
            Ok([0xFF; 32])
        }
        fn algorithm_type(&self) -> AlgorithmType {
            AlgorithmType::CryptoNight
        }
    }

    fn coordinator() -> MiningCoordinator {
        MiningCoordinator::new(
            Arc::new(Unreachable),
            Arc::new(Idle),
            CoordinatorOptions {
                inventory: DeviceInventory {
                    cpu_units: 2,
                    accelerator_units: 0,
                },
                ..CoordinatorOptions::default()
            },
        )
    }

    fn worker(id: &str, weight: f64) -> Worker {
        Worker::new(id, "pool.test", 3333, "4Abc").with_weight(weight)
    }

    #[test]
    fn planned_allocations_follow_weights() {
        let coordinator = coordinator();
        coordinator
            .configure(vec![worker("a", 1.0), worker("b", 3.0)], 0.8, 0.0)
            .unwrap();

        let split = coordinator.allocations();
        assert_eq!(split[0].0, "a");
        assert!((split[0].1.cpu - 0.2).abs() < 1e-9);
        assert!((split[1].1.cpu - 0.6).abs() < 1e-9);
        assert_eq!(
            coordinator.connection_state("a"),
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(coordinator.connection_state("zz"), None);
    }

    #[test]
    fn limits_are_checked() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.set_limits(1.5, 0.0),
            Err(MinerError::ConfigError(_))
        ));
        coordinator.set_limits(0.5, 0.25).unwrap();
        assert_eq!(coordinator.limits(), CapacityLimits::new(0.5, 0.25).unwrap());
    }

    #[test]
    fn reconfiguring_while_active_is_a_state_error() {
        let coordinator = coordinator();
        coordinator.configure(vec![worker("a", 1.0)], 0.5, 0.0).unwrap();
        coordinator.start().unwrap();
        assert!(coordinator.is_active());

        assert!(matches!(
            coordinator.configure(vec![worker("b", 1.0)], 0.5, 0.0),
            Err(MinerError::StateError(_))
        ));
        assert!(matches!(
            coordinator.set_limits(1.0, 0.0),
            Err(MinerError::StateError(_))
        ));

        coordinator.stop();
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.hash_rate(), 0.0);
        coordinator.configure(vec![worker("b", 1.0)], 0.5, 0.0).unwrap();
    }

    #[test]
    fn stop_during_start_is_not_lost() {
        let coordinator = coordinator();
        coordinator.configure(vec![worker("a", 1.0)], 0.5, 0.0).unwrap();

        let stops = coordinator.stops.load(Ordering::SeqCst);
        let session = MiningSession::start(
            &coordinator.workers(),
            coordinator.session_params(coordinator.limits()),
            Arc::clone(&coordinator.bus),
        )
        .unwrap();
        // Lands after start() read the stop count but before it stored
        // the session
        coordinator.stop();
        coordinator.publish(session, stops);

        assert!(!coordinator.is_active());
        assert!(coordinator.session.load().is_none());
        coordinator.start().unwrap();
        assert!(coordinator.is_active());
        coordinator.stop();
    }
}
