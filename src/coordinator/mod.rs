// src/coordinator/mod.rs
//! Mining coordination
//!
//! - [`MiningCoordinator`]: public entry point (configure, start, stop,
//!   hash rate, events)
//! - [`MiningSession`]: what exists while mining (runtime, slots, dispatcher)
//! - [`WorkerSlot`]: one worker's engine, meter and counters
//! - [`MinerDelegate`] / [`MiningEvent`]: how results reach the application

/// Public coordinator
pub mod coordinator;

/// Delegate trait, event enum and dispatcher
pub mod events;

/// Running session
pub mod session;

/// Per-worker state inside a session
pub mod slot;

pub use coordinator::{CoordinatorOptions, MiningCoordinator};
pub use events::{EventBus, MinerDelegate, MiningEvent};
pub use session::MiningSession;
pub use slot::{SlotStats, WorkerSlot};
