// src/utils/mod.rs
//! Shared error handling and logging setup.

/// Error types and handling utilities
///
/// Contains the [`MinerError`] enum and its conversions.
pub mod error;

/// Logging initialization for binaries
pub mod logging;

// Re-export for easier access
pub use error::MinerError;
pub use logging::{init_bench_logging, init_logging};
