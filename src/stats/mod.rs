//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Hashrate calculations over a sliding window
//! - Share acceptance/rejection totals
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! Lanes write into a [`HashRateMeter`]; a [`StatsReporter`] periodically logs
//! a snapshot taken from any [`StatsSource`].

/// Sliding-window hash-rate meter
pub mod meter;

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Hardware monitoring
/// - Periodic reporting of stats on a background thread
pub mod reporter;

// Re-export main components
pub use meter::HashRateMeter;
pub use reporter::{HardwareStats, MiningStats, ReporterHandle, StatsReporter, StatsSource};
