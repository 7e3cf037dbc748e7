// src/miner/capacity.rs
//! Compute capacity limits and their division between workers
//!
//! Limits are fractions of the machine: `cpu_limit = 1` means every CPU core,
//! `accelerator_limit = 0.5` half of the accelerator units. Each worker gets
//! `limit * weight / Σweights` of each pool, and a fraction is turned into
//! lanes (threads) plus a duty cycle for the leftover part of a unit.

use crate::types::LaneKind;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};

/// Upper bounds on how much of the machine mining may use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityLimits {
    /// CPU usage limit (0 disables CPU mining)
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,

    /// Accelerator usage limit (0 disables accelerator lanes)
    #[serde(default)]
    pub accelerator_limit: f64,
}

fn default_cpu_limit() -> f64 {
    1.0
}

impl Default for CapacityLimits {
    fn default() -> Self {
        CapacityLimits {
            cpu_limit: default_cpu_limit(),
            accelerator_limit: 0.0,
        }
    }
}

impl CapacityLimits {
    /// Builds validated limits
    ///
    /// # Errors
    /// `MinerError::ConfigError` if either value is outside `0..=1`
    pub fn new(cpu_limit: f64, accelerator_limit: f64) -> Result<Self, MinerError> {
        let limits = CapacityLimits {
            cpu_limit,
            accelerator_limit,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Checks both fractions are within `0..=1`
    pub fn validate(&self) -> Result<(), MinerError> {
        for (name, value) in [
            ("cpu_limit", self.cpu_limit),
            ("accelerator_limit", self.accelerator_limit),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MinerError::ConfigError(format!(
                    "{} must be within 0..=1, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Sum of both limits; the ceiling for any allocation
    pub fn total(&self) -> f64 {
        self.cpu_limit + self.accelerator_limit
    }
}

/// Fraction of each device pool assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Allocation {
    /// Fraction of all CPU units
    pub cpu: f64,
    /// Fraction of all accelerator units
    pub accelerator: f64,
}

impl Allocation {
    /// Fraction for the given lane kind
    pub fn fraction(&self, kind: LaneKind) -> f64 {
        match kind {
            LaneKind::Cpu => self.cpu,
            LaneKind::Accelerator => self.accelerator,
        }
    }

    /// Combined fraction across both pools
    pub fn total(&self) -> f64 {
        self.cpu + self.accelerator
    }

    /// True when the worker gets no compute at all
    pub fn is_idle(&self) -> bool {
        self.total() <= 0.0
    }
}

/// Splits the limits between workers proportionally to their weights
///
/// The last worker receives the remainder so the parts never add up to more
/// than the limit. Non-positive weights get nothing.
pub fn allocate(limits: &CapacityLimits, weights: &[f64]) -> Vec<Allocation> {
    let total_weight: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total_weight <= 0.0 {
        return vec![Allocation::default(); weights.len()];
    }

    let last = weights.iter().rposition(|w| *w > 0.0);
    let mut cpu_given = 0.0;
    let mut accelerator_given = 0.0;

    weights
        .iter()
        .enumerate()
        .map(|(i, &weight)| {
            if weight <= 0.0 {
                return Allocation::default();
            }
            let allocation = if Some(i) == last {
                Allocation {
                    cpu: (limits.cpu_limit - cpu_given).max(0.0),
                    accelerator: (limits.accelerator_limit - accelerator_given).max(0.0),
                }
            } else {
                let share = weight / total_weight;
                Allocation {
                    cpu: limits.cpu_limit * share,
                    accelerator: limits.accelerator_limit * share,
                }
            };
            cpu_given += allocation.cpu;
            accelerator_given += allocation.accelerator;
            allocation
        })
        .collect()
}

/// Compute units available on this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInventory {
    /// Logical CPU cores
    pub cpu_units: usize,
    /// Accelerator units (no accelerator kernels are bundled; set explicitly)
    pub accelerator_units: usize,
}

impl DeviceInventory {
    /// Detects CPU cores; `0` for either override means auto/none
    pub fn detect(cpu_override: usize, accelerator_units: usize) -> Self {
        DeviceInventory {
            cpu_units: if cpu_override == 0 {
                num_cpus::get()
            } else {
                cpu_override
            },
            accelerator_units,
        }
    }

    /// Units of the given kind
    pub fn units(&self, kind: LaneKind) -> usize {
        match kind {
            LaneKind::Cpu => self.cpu_units,
            LaneKind::Accelerator => self.accelerator_units,
        }
    }
}

/// How a fraction of a device pool is realised as threads
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LanePlan {
    /// Number of lanes to run
    pub lanes: usize,
    /// Share of wall time each lane spends hashing (0..=1)
    pub duty: f64,
}

impl LanePlan {
    /// Plans lanes for `fraction` of `units`
    ///
    /// `0.25` of 8 cores is 2 full lanes; `0.3` of 8 cores is 3 lanes at
    /// duty 0.8.
    pub fn for_fraction(fraction: f64, units: usize) -> Self {
        let effective = fraction.clamp(0.0, 1.0) * units as f64;
        if effective <= f64::EPSILON {
            return LanePlan::default();
        }
        let lanes = (effective - 1e-9).ceil().max(1.0) as usize;
        LanePlan {
            lanes,
            duty: (effective / lanes as f64).min(1.0),
        }
    }

    /// Capacity actually used, in device units
    pub fn effective_units(&self) -> f64 {
        self.lanes as f64 * self.duty
    }
}

/// Lane plans for both device pools of one engine
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnginePlan {
    /// CPU lanes
    pub cpu: LanePlan,
    /// Accelerator lanes
    pub accelerator: LanePlan,
}

impl EnginePlan {
    /// Plans an allocation against the machine inventory
    pub fn new(allocation: Allocation, inventory: &DeviceInventory) -> Self {
        EnginePlan {
            cpu: LanePlan::for_fraction(allocation.cpu, inventory.cpu_units),
            accelerator: LanePlan::for_fraction(
                allocation.accelerator,
                inventory.accelerator_units,
            ),
        }
    }

    /// Plan for one lane kind
    pub fn lanes(&self, kind: LaneKind) -> LanePlan {
        match kind {
            LaneKind::Cpu => self.cpu,
            LaneKind::Accelerator => self.accelerator,
        }
    }
}
