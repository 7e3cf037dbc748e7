// src/miner/algorithm/mod.rs
//! Hashing backends
//!
//! The engine never hashes by itself; it hands complete blobs (nonce already
//! written) to an [`Algorithm`]. Kernels come from external crates:
//! - CryptoNight variants via `cryptonight-rs`
//! - RandomX via `rust-randomx`

/// CryptoNight algorithm implementations (variants 0, 1 and 4)
pub mod cryptonight;

/// RandomX algorithm implementation
///
/// Requires a dataset keyed by the job's seed hash.
pub mod randomx;

use crate::miner::job::MiningJob;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use std::sync::Arc;

use self::cryptonight::CryptoNightAlgo;
use self::randomx::RandomX;

/// Common interface for all mining algorithms
///
/// Implementations are shared by every lane of every worker, so they must be
/// cheap to call concurrently.
pub trait Algorithm: Send + Sync {
    /// Compute the hash of a complete blob
    ///
    /// # Arguments
    /// * `blob` - Hashing blob with the nonce already in place
    ///
    /// # Returns
    /// 32-byte hash result or error if computation fails
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError>;

    /// Compute the hash of a blob built from `job`
    ///
    /// Backends whose state depends on the job (RandomX seed) pick it from
    /// `job` here, so workers on different jobs can share one backend. The
    /// default ignores the job.
    fn hash_job(&self, _job: &MiningJob, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        self.hash(blob)
    }

    /// Prepare for a new job before lanes start hashing it
    ///
    /// Called off the async runtime since it may take seconds (RandomX
    /// dataset initialisation). The default does nothing.
    fn prepare(&self, _job: &MiningJob) -> Result<(), MinerError> {
        Ok(())
    }

    /// Get the algorithm type
    fn algorithm_type(&self) -> AlgorithmType;
}

/// Creates the backend for an algorithm type
///
/// # Arguments
/// * `algo` - Algorithm to instantiate
/// * `randomx_fast` - Use the full RandomX dataset (~2 GB) instead of light mode
pub fn create(algo: AlgorithmType, randomx_fast: bool) -> Arc<dyn Algorithm> {
    match algo {
        AlgorithmType::CryptoNight => Arc::new(CryptoNightAlgo::new(0)),
        AlgorithmType::CryptoNightV7 => Arc::new(CryptoNightAlgo::new(1)),
        AlgorithmType::CryptoNightR => Arc::new(CryptoNightAlgo::new(4)),
        AlgorithmType::RandomX => Arc::new(RandomX::new(randomx_fast)),
    }
}
