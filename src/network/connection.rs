// src/network/connection.rs
//! Per-worker pool connection state machine
//!
//! ```text
//! Disconnected -> Connecting -> Authenticated -> Mining
//!                     ^                            |
//!                     +------- Reconnecting <------+  (transient failure)
//! ```
//!
//! Transient failures reconnect with backoff; a refused login, an exhausted
//! retry budget or the share-rejection threshold end the connection for good.
//! Share submissions are awaited concurrently so a slow acknowledgement never
//! holds up job updates.

use crate::config::Worker;
use crate::miner::engine::HashEngine;
use crate::miner::job::{MiningJob, Share};
use crate::network::connector::{
    PoolChannel, PoolConnector, PoolNotification, PoolRequest, ShareAck,
};
use crate::network::retry::RetryPolicy;
use crate::utils::error::MinerError;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected (initial, stopped or failed)
    Disconnected,
    /// Opening the link and logging in
    Connecting,
    /// Logged in, waiting for the first job
    Authenticated,
    /// Hashing a pool job
    Mining,
    /// Waiting out the backoff after a transient failure
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Mining => "mining",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// What to do after a rejected share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep mining
    Continue,
    /// Rejection threshold reached; stop this worker
    Stop,
}

/// Receives everything a connection reports upward
///
/// Called from the connection's task; implementations must not block.
pub trait ConnectionObserver: Send + Sync {
    /// The connection moved to a new state
    fn state_changed(&self, state: ConnectionState);
    /// A job was installed in the engine
    fn job_received(&self, job_id: &str, difficulty: u64);
    /// The pool accepted a share
    fn share_accepted(&self, share: &Share);
    /// The pool rejected a share
    fn share_rejected(&self, share: &Share, reason: &str) -> Verdict;
    /// The pool reported a found block
    fn block_found(&self);
    /// A transient failure; the connection will retry
    fn transient_error(&self, error: MinerError);
}

/// How a connection ended
#[derive(Debug)]
pub enum ConnectionExit {
    /// Shutdown was requested; in-flight shares were flushed
    Shutdown,
    /// Unrecoverable error; the worker is done for this session
    Fatal(MinerError),
}

/// Timing knobs for a connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Reconnect backoff
    pub retry: RetryPolicy,
    /// Interval between keep-alive requests
    pub keepalive: Duration,
    /// How long shutdown waits for outstanding share acknowledgements
    pub flush_timeout: Duration,
    /// Client identification sent at login
    pub agent: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            retry: RetryPolicy::default(),
            keepalive: Duration::from_secs(60),
            flush_timeout: Duration::from_secs(5),
            agent: format!("xmr_kit-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

type SubmitOutcome = (Share, Result<ShareAck, MinerError>);
type Pending = FuturesUnordered<BoxFuture<'static, SubmitOutcome>>;

/// One worker's connection to its pool
pub struct PoolConnection {
    worker: Worker,
    connector: Arc<dyn PoolConnector>,
    engine: Arc<HashEngine>,
    observer: Arc<dyn ConnectionObserver>,
    settings: ConnectionSettings,
}

impl PoolConnection {
    /// Creates a connection; nothing happens until [`PoolConnection::run`]
    pub fn new(
        worker: Worker,
        connector: Arc<dyn PoolConnector>,
        engine: Arc<HashEngine>,
        observer: Arc<dyn ConnectionObserver>,
        settings: ConnectionSettings,
    ) -> Self {
        PoolConnection {
            worker,
            connector,
            engine,
            observer,
            settings,
        }
    }

    /// Drives the connection until shutdown or a fatal error
    ///
    /// # Arguments
    /// * `shares` - Shares found by this worker's engine
    /// * `shutdown` - Flips to `true` (or closes) when the session stops
    pub async fn run(
        self,
        mut shares: UnboundedReceiver<Share>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConnectionExit {
        let mut backoff = self.settings.retry.backoff();

        let exit = loop {
            if *shutdown.borrow() {
                break ConnectionExit::Shutdown;
            }

            self.observer.state_changed(ConnectionState::Connecting);
            let established = tokio::select! {
                result = self.establish() => result,
                _ = shutdown.changed() => break ConnectionExit::Shutdown,
            };

            let failure = match established {
                Ok((channel, first_job)) => {
                    backoff.reset();
                    // Anything queued belongs to a job from the previous link
                    while shares.try_recv().is_ok() {}
                    match self
                        .mine(channel, first_job, &mut shares, &mut shutdown)
                        .await
                    {
                        Ok(()) => break ConnectionExit::Shutdown,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.engine.clear_job();
            if failure.is_fatal() {
                break ConnectionExit::Fatal(failure);
            }

            log::warn!(
                "Worker '{}': {} (retrying)",
                self.worker.identifier,
                failure
            );
            self.observer.transient_error(failure);
            self.observer.state_changed(ConnectionState::Reconnecting);

            let Some(delay) = backoff.next_delay() else {
                break ConnectionExit::Fatal(MinerError::ConnectionError(format!(
                    "Giving up on {}:{} after {} attempts",
                    self.worker.pool_host,
                    self.worker.pool_port,
                    backoff.attempts()
                )));
            };
            log::debug!(
                "Worker '{}': reconnecting in {:?}",
                self.worker.identifier,
                delay
            );
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.changed() => break ConnectionExit::Shutdown,
            }
        };

        self.engine.clear_job();
        self.observer.state_changed(ConnectionState::Disconnected);
        exit
    }

    /// Opens the link and logs in
    async fn establish(&self) -> Result<(PoolChannel, Option<MiningJob>), MinerError> {
        let channel = self.connector.connect(&self.worker).await?;

        let (reply, answer) = oneshot::channel();
        channel
            .requests
            .send(PoolRequest::Login {
                wallet: self.worker.wallet_address.clone(),
                password: self.worker.password.clone(),
                agent: self.settings.agent.clone(),
                reply,
            })
            .await?;
        let login = answer.await??;

        log::info!(
            "Worker '{}': logged in to {}:{} (session {})",
            self.worker.identifier,
            self.worker.pool_host,
            self.worker.pool_port,
            login.session_id
        );
        self.observer.state_changed(ConnectionState::Authenticated);
        Ok((channel, login.job))
    }

    /// Main loop of an established link
    ///
    /// Returns `Ok(())` only after a requested shutdown has been flushed.
    async fn mine(
        &self,
        channel: PoolChannel,
        first_job: Option<MiningJob>,
        shares: &mut UnboundedReceiver<Share>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MinerError> {
        let PoolChannel {
            requests,
            mut notifications,
        } = channel;

        let mut pending: Pending = FuturesUnordered::new();
        if let Some(job) = first_job {
            if !self.install(job, shutdown).await? {
                return self.flush(requests, pending, shares).await;
            }
        }

        let period = self.settings.keepalive.max(Duration::from_millis(100));
        let mut keepalive = time::interval_at(time::Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    return self.flush(requests, pending, shares).await;
                }
                Some(share) = shares.recv() => {
                    pending.push(submit(requests.clone(), share).boxed());
                }
                Some((share, result)) = pending.next(), if !pending.is_empty() => {
                    self.settle(&share, result)?;
                }
                note = notifications.recv() => match note {
                    Some(PoolNotification::Job(job)) => {
                        if !self.install(job, shutdown).await? {
                            return self.flush(requests, pending, shares).await;
                        }
                    }
                    Some(PoolNotification::BlockFound) => {
                        log::info!("Worker '{}': pool found a block", self.worker.identifier);
                        self.observer.block_found();
                    }
                    Some(PoolNotification::Closed(Some(e))) => return Err(e),
                    Some(PoolNotification::Closed(None)) | None => {
                        return Err(MinerError::ConnectionError(
                            "Pool closed the connection".into(),
                        ));
                    }
                },
                _ = keepalive.tick() => {
                    requests.send(PoolRequest::KeepAlive).await?;
                }
            }
        }
    }

    /// Hands a job to the engine off the async runtime
    ///
    /// Returns `false` if shutdown was requested while the engine was still
    /// preparing (a RandomX dataset build can take minutes); the preparation
    /// is left to finish on its own.
    async fn install(
        &self,
        job: MiningJob,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, MinerError> {
        let job_id = job.job_id.clone();
        let difficulty = job.difficulty();
        let engine = Arc::clone(&self.engine);
        let preparing = tokio::task::spawn_blocking(move || engine.update_job(job));

        tokio::select! {
            installed = preparing => installed??,
            _ = shutdown.changed() => {
                log::info!(
                    "Worker '{}': stopping while job {} was still being prepared",
                    self.worker.identifier,
                    job_id
                );
                return Ok(false);
            }
        }

        self.observer.job_received(&job_id, difficulty);
        self.observer.state_changed(ConnectionState::Mining);
        Ok(true)
    }

    /// Applies a pool verdict
    fn settle(&self, share: &Share, result: Result<ShareAck, MinerError>) -> Result<(), MinerError> {
        match result? {
            ShareAck::Accepted => {
                log::debug!(
                    "Worker '{}': share {} accepted",
                    self.worker.identifier,
                    share.nonce_hex()
                );
                self.observer.share_accepted(share);
                Ok(())
            }
            ShareAck::Rejected(reason) => {
                log::warn!(
                    "Worker '{}': share {} rejected: {}",
                    self.worker.identifier,
                    share.nonce_hex(),
                    reason
                );
                match self.observer.share_rejected(share, &reason) {
                    Verdict::Continue => Ok(()),
                    Verdict::Stop => Err(MinerError::ShareRejectedError(format!(
                        "Rejection threshold reached for worker '{}' (last reason: {})",
                        self.worker.identifier, reason
                    ))),
                }
            }
        }
    }

    /// Submits what the engine left behind, waits for verdicts, closes
    async fn flush(
        &self,
        requests: mpsc::Sender<PoolRequest>,
        mut pending: Pending,
        shares: &mut UnboundedReceiver<Share>,
    ) -> Result<(), MinerError> {
        shares.close();
        while let Ok(share) = shares.try_recv() {
            pending.push(submit(requests.clone(), share).boxed());
        }

        if !pending.is_empty() {
            log::info!(
                "Worker '{}': flushing {} in-flight share(s)",
                self.worker.identifier,
                pending.len()
            );
            let drained = time::timeout(self.settings.flush_timeout, async {
                while let Some((share, result)) = pending.next().await {
                    if let Err(e) = self.settle(&share, result) {
                        log::warn!("Worker '{}': {}", self.worker.identifier, e);
                    }
                }
            })
            .await;
            if drained.is_err() {
                log::warn!(
                    "Worker '{}': gave up waiting for share acknowledgements",
                    self.worker.identifier
                );
            }
        }

        let _ = requests.send(PoolRequest::Close).await;
        Ok(())
    }
}

async fn submit(requests: mpsc::Sender<PoolRequest>, share: Share) -> SubmitOutcome {
    let result = submit_share(&requests, share.clone()).await;
    (share, result)
}

async fn submit_share(
    requests: &mpsc::Sender<PoolRequest>,
    share: Share,
) -> Result<ShareAck, MinerError> {
    let (reply, answer) = oneshot::channel();
    requests.send(PoolRequest::Submit { share, reply }).await?;
    answer.await?
}
