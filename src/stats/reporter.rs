// src/stats/reporter.rs
use crate::utils::error::MinerError;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use sysinfo::{Components, System};

/// Statistics related to mining performance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningStats {
    /// Time since the session started
    pub uptime: Duration,
    /// Combined hash rate of all workers (hashes per second)
    pub hash_rate: f64,
    /// Total number of hashes computed this session
    pub hashes_total: u64,
    /// Number of shares accepted by the pools
    pub shares_accepted: u64,
    /// Number of shares rejected by the pools
    pub shares_rejected: u64,
    /// Workers still mining
    pub workers_live: usize,
    /// Workers the session started with
    pub workers_total: usize,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used by the system (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius (0 when no sensor is exposed)
    pub temperature: f32,
}

/// Anything that can produce a mining statistics snapshot
pub trait StatsSource: Send + Sync {
    /// Current statistics
    fn mining_stats(&self) -> MiningStats;
}

/// Periodically logs mining and hardware statistics
pub struct StatsReporter {
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
    /// Interval at which stats are reported
    report_interval: Duration,
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often to log statistics
    pub fn new(report_interval: Duration) -> Self {
        StatsReporter {
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
            report_interval: report_interval.max(Duration::from_secs(1)),
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn get_hardware_stats(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }

    /// One log line for a pair of snapshots
    pub fn format_line(mining: &MiningStats, hardware: &HardwareStats) -> String {
        format!(
            "Hashrate: {:.2} H/s | Accepted/Rejected: {}/{} | Workers: {}/{} | CPU: {:.1}% | Temp: {:.1}°C",
            mining.hash_rate,
            mining.shares_accepted,
            mining.shares_rejected,
            mining.workers_live,
            mining.workers_total,
            hardware.cpu_usage,
            hardware.temperature
        )
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Spawns a background thread that logs at the configured interval until
    /// the returned handle is stopped.
    ///
    /// # Errors
    /// `MinerError::IoError` if the thread cannot be spawned
    pub fn spawn(mut self, source: Arc<dyn StatsSource>) -> Result<ReporterHandle, MinerError> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let interval = self.report_interval;

        let handle = thread::Builder::new()
            .name("stats-reporter".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let mining = source.mining_stats();
                            let hardware = self.get_hardware_stats();
                            log::info!("{}", Self::format_line(&mining, &hardware));
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(ReporterHandle { stop, handle })
    }
}

/// Running reporter thread
pub struct ReporterHandle {
    stop: crossbeam_channel::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReporterHandle {
    /// Stops reporting and joins the thread
    pub fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            log::error!("Stats reporter panicked");
        }
    }
}
