// src/network/connector.rs
//! Seam between the pool connection logic and the wire protocol
//!
//! A [`PoolConnector`] opens a link to a pool and hands back a
//! [`PoolChannel`]: requests go in on one channel (each carrying a oneshot for
//! its reply), pool-initiated messages come out on the other. The link task
//! behind the channel owns the socket, so any number of requests can be in
//! flight while notifications keep flowing.

use crate::config::Worker;
use crate::miner::job::{MiningJob, Share};
use crate::utils::error::MinerError;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

/// Reply slot for a request
pub type Reply<T> = oneshot::Sender<Result<T, MinerError>>;

/// Requests a pool connection sends down the link
#[derive(Debug)]
pub enum PoolRequest {
    /// Authenticate; a refused login is answered with `MinerError::AuthError`
    Login {
        /// Wallet address or username
        wallet: String,
        /// Pool password
        password: String,
        /// Client identification
        agent: String,
        /// Receives the pool's answer
        reply: Reply<LoginReply>,
    },
    /// Submit a share and wait for the verdict
    Submit {
        /// Share to submit
        share: Share,
        /// Receives accept/reject
        reply: Reply<ShareAck>,
    },
    /// Keep the session alive
    KeepAlive,
    /// Close the link
    Close,
}

/// Successful login
#[derive(Debug, Clone, PartialEq)]
pub struct LoginReply {
    /// Session id assigned by the pool
    pub session_id: String,
    /// First job, when the pool sends one with the login answer
    pub job: Option<MiningJob>,
}

/// Pool verdict on a submitted share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareAck {
    /// Share counted by the pool
    Accepted,
    /// Share refused, with the pool's reason
    Rejected(String),
}

/// Pool-initiated messages
#[derive(Debug)]
pub enum PoolNotification {
    /// New job (and possibly new difficulty)
    Job(MiningJob),
    /// The pool found a block
    BlockFound,
    /// Link is gone; `None` for an orderly close
    Closed(Option<MinerError>),
}

/// Both ends of an open pool link
#[derive(Debug)]
pub struct PoolChannel {
    /// Requests to the pool
    pub requests: mpsc::Sender<PoolRequest>,
    /// Messages from the pool
    pub notifications: mpsc::Receiver<PoolNotification>,
}

/// Opens links to mining pools
///
/// Implementations must be shareable across workers; every call to
/// [`PoolConnector::connect`] yields an independent link.
pub trait PoolConnector: Send + Sync {
    /// Connects to the worker's pool
    ///
    /// # Errors
    /// Transient failures (DNS, refused, reset) should be reported as
    /// `MinerError::ConnectionError` so the caller retries.
    fn connect<'a>(&'a self, worker: &'a Worker) -> BoxFuture<'a, Result<PoolChannel, MinerError>>;
}
