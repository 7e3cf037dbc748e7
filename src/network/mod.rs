// src/network/mod.rs
//! Network communication components
//!
//! This module handles everything between a worker and its mining pool:
//! - `PoolConnector`: the seam that opens a link to a pool
//! - `StratumConnector`: Monero stratum over TCP/TLS or WebSocket
//! - `PoolConnection`: the per-worker state machine (login, jobs, shares,
//!   reconnects)

/// Pool link abstraction
///
/// Request/notification channels that decouple the connection state machine
/// from the wire protocol.
pub mod connector;

/// Per-worker connection state machine
pub mod connection;

/// Reconnect backoff
pub mod retry;

/// Monero stratum client
///
/// Speaks JSON-RPC over WebSocket: login, job notifications, share
/// submission and keep-alives.
pub mod stratum;

// Re-export main components for cleaner imports
pub use connection::{
    ConnectionExit, ConnectionObserver, ConnectionSettings, ConnectionState, PoolConnection,
    Verdict,
};
pub use connector::{LoginReply, PoolChannel, PoolConnector, PoolNotification, PoolRequest, ShareAck};
pub use retry::{Backoff, RetryPolicy};
pub use stratum::{StratumConnector, Transport};
