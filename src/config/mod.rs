// src/config/mod.rs
//! Configuration management for the miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading, parsing and validating configuration files
//! - Generating configuration templates
//! - Pool worker descriptors
//!
//! The configuration uses TOML format with one `[[workers]]` table per pool
//! worker.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and the section types that define the
/// miner's configuration structure and behavior.
pub mod config;

/// Pool worker descriptors and validation
pub mod worker;

// Re-export key items for easy access
pub use config::{Config, EngineSettings, SessionSettings};
pub use worker::{Worker, base_address, validate_workers};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    Config::load(path)
}

/// Generates a commented configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
