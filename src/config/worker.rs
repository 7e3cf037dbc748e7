// src/config/worker.rs
//! Pool worker descriptors
//!
//! A [`Worker`] names one pool account the coordinator mines for. Several
//! workers share the machine according to their weights.

use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pool worker descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Worker identifier used in callbacks; unique within a coordinator
    pub identifier: String,

    /// Mining pool hostname
    pub pool_host: String,

    /// Mining pool port
    pub pool_port: u16,

    /// Pool expects a TLS connection
    #[serde(default)]
    pub secure: bool,

    /// Pool uses the NiceHash nonce convention (top nonce byte reserved)
    #[serde(default)]
    pub nicehash: bool,

    /// Wallet address for payouts, or pool username
    pub wallet_address: String,

    /// Pool password (most pools accept "x")
    #[serde(default = "default_password")]
    pub password: String,

    /// Relative share of compute for load balancing
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_password() -> String {
    "x".into()
}

fn default_weight() -> f64 {
    1.0
}

impl Worker {
    /// Creates a worker with password "x" and weight 1
    pub fn new(
        identifier: impl Into<String>,
        pool_host: impl Into<String>,
        pool_port: u16,
        wallet_address: impl Into<String>,
    ) -> Self {
        Worker {
            identifier: identifier.into(),
            pool_host: pool_host.into(),
            pool_port,
            secure: false,
            nicehash: false,
            wallet_address: wallet_address.into(),
            password: default_password(),
            weight: default_weight(),
        }
    }

    /// Sets the pool password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the load-balancing weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Marks the pool as TLS
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Marks the pool as NiceHash-style
    pub fn with_nicehash(mut self, nicehash: bool) -> Self {
        self.nicehash = nicehash;
        self
    }

    /// Wallet address without pool-specific suffixes
    pub fn base_wallet(&self) -> &str {
        base_address(&self.wallet_address)
    }
}

/// Extracts the base wallet address from a full pool login
///
/// Pools accept extras appended to the address, e.g. `ADDRESS.rig1` for a
/// worker name or `ADDRESS+50000` for a fixed difficulty. Monero addresses are
/// base58 and never contain `.` or `+`, so the first one marks the end.
pub fn base_address(wallet_address: &str) -> &str {
    match wallet_address.find(['.', '+']) {
        Some(idx) => &wallet_address[..idx],
        None => wallet_address,
    }
}

/// Checks a worker set before it is handed to a coordinator
///
/// # Errors
/// `MinerError::ConfigError` on an empty or duplicated identifier, an empty
/// pool host, or a weight that is not a positive finite number.
pub fn validate_workers(workers: &[Worker]) -> Result<(), MinerError> {
    let mut seen = HashSet::with_capacity(workers.len());

    for worker in workers {
        if worker.identifier.trim().is_empty() {
            return Err(MinerError::ConfigError(
                "Worker identifier must not be empty".into(),
            ));
        }
        if !seen.insert(worker.identifier.as_str()) {
            return Err(MinerError::ConfigError(format!(
                "Duplicate worker identifier '{}'",
                worker.identifier
            )));
        }
        if !worker.weight.is_finite() || worker.weight <= 0.0 {
            return Err(MinerError::ConfigError(format!(
                "Worker '{}' has invalid weight {}; weights must be > 0",
                worker.identifier, worker.weight
            )));
        }
        if worker.pool_host.trim().is_empty() {
            return Err(MinerError::ConfigError(format!(
                "Worker '{}' has no pool host",
                worker.identifier
            )));
        }
    }

    Ok(())
}
