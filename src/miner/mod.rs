// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the hashing side:
//! - Algorithm bindings (RandomX, CryptoNight)
//! - Pool jobs, targets and shares
//! - Capacity limits and their split into lanes
//! - The per-worker hash engine

/// Mining algorithm implementations
///
/// Contains bindings for supported mining algorithms:
/// - RandomX (for Monero's current algorithm)
/// - CryptoNight variants (for historical/alternative chains)
pub mod algorithm;

/// Capacity limits, per-worker allocation and lane planning
pub mod capacity;

/// Hash engine
///
/// Runs lanes over work units of the current job and reports shares and
/// throughput.
pub mod engine;

/// Mining jobs, targets and shares
pub mod job;

// Re-export main components for cleaner imports
pub use self::algorithm::Algorithm;
pub use self::capacity::{Allocation, CapacityLimits, DeviceInventory};
pub use self::engine::{HashEngine, WorkStream, WorkUnit};
pub use self::job::{MiningJob, Share};
