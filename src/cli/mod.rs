// src/cli/mod.rs
//! Command-line interface of the `xmr-kit` binary

/// Clap command and option definitions
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, StartOptions};
