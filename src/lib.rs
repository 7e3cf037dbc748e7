//! xmr_kit-rs - Monero pool mining coordinator in Rust
//!
//! This crate drives pool mining for several workers at once:
//! - Capacity limits for CPU and accelerator lanes, split by worker weight
//! - Multiple mining algorithms (RandomX, CryptoNight variants)
//! - Monero stratum over WebSocket with reconnect and backoff
//! - Hash-rate accounting and delegate/event notifications
//! - Performance benchmarking and hardware monitoring

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Mining coordination: coordinator, sessions, worker slots, events
pub mod coordinator;

/// Miner core implementation including algorithms, jobs and the hash engine
pub mod miner;

/// Network communication components for pool connections
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::{Config, Worker};
pub use coordinator::{CoordinatorOptions, MinerDelegate, MiningCoordinator, MiningEvent};
pub use miner::{Algorithm, Allocation, CapacityLimits, HashEngine, MiningJob, Share};
pub use network::{ConnectionState, PoolConnector, RetryPolicy, StratumConnector, Transport};
pub use stats::{HardwareStats, HashRateMeter, MiningStats, StatsReporter};
pub use types::AlgorithmType;
pub use utils::{MinerError, init_logging};
