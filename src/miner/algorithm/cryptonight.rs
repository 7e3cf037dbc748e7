// src/miner/algorithm/cryptonight.rs
//! CryptoNight algorithm binding
//!
//! Supports variant 0 (original), 1 (V7) and 4 (R). The struct only records
//! the variant; the scratchpad lives inside the `cryptonight` call.

use crate::miner::algorithm::Algorithm;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use cryptonight::cryptonight;

/// CryptoNight algorithm implementation
pub struct CryptoNightAlgo {
    /// Variant number passed to the kernel
    variant: i32,
}

impl CryptoNightAlgo {
    /// Creates a CryptoNight backend for `variant` (0, 1 or 4)
    pub fn new(variant: i32) -> Self {
        Self { variant }
    }
}

impl Algorithm for CryptoNightAlgo {
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        let hash = cryptonight(blob, blob.len(), self.variant);
        hash.try_into().map_err(|raw: Vec<u8>| {
            MinerError::AlgorithmError(format!(
                "CryptoNight returned {} bytes instead of 32",
                raw.len()
            ))
        })
    }

    fn algorithm_type(&self) -> AlgorithmType {
        match self.variant {
            0 => AlgorithmType::CryptoNight,
            1 => AlgorithmType::CryptoNightV7,
            _ => AlgorithmType::CryptoNightR,
        }
    }
}
