// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proof-of-work algorithms the hash engine can drive
///
/// The kernels themselves come from external crates; this enum only selects
/// which binding the engine hands work to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum AlgorithmType {
    /// Original CryptoNight (variant 0)
    #[clap(name = "cryptonight")]
    #[serde(rename = "cryptonight")]
    CryptoNight,

    /// CryptoNight variant 1, used by Monero from March 2018
    #[clap(name = "cryptonight-v7")]
    #[serde(rename = "cryptonight-v7")]
    CryptoNightV7,

    /// CryptoNight-R (variant 4)
    #[clap(name = "cryptonight-r")]
    #[serde(rename = "cryptonight-r")]
    CryptoNightR,

    /// RandomX, Monero's current CPU-oriented algorithm
    #[clap(name = "randomx")]
    #[serde(rename = "randomx")]
    RandomX,
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::CryptoNight => write!(f, "cryptonight"),
            AlgorithmType::CryptoNightV7 => write!(f, "cryptonight-v7"),
            AlgorithmType::CryptoNightR => write!(f, "cryptonight-r"),
            AlgorithmType::RandomX => write!(f, "randomx"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    /// Accepts our names plus the short aliases pools put in the `algo` field
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cn" | "cn/0" | "cryptonight" => Ok(AlgorithmType::CryptoNight),
            "cnv7" | "cn/1" | "cryptonight-v7" => Ok(AlgorithmType::CryptoNightV7),
            "cnr" | "cn/r" | "cryptonight-r" => Ok(AlgorithmType::CryptoNightR),
            "rx/0" | "randomx" => Ok(AlgorithmType::RandomX),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}

/// Kind of compute a hashing lane is bound to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaneKind {
    /// One CPU core
    Cpu,
    /// One accelerator unit
    Accelerator,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Cpu => write!(f, "cpu"),
            LaneKind::Accelerator => write!(f, "accel"),
        }
    }
}
