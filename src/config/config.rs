// src/config/config.rs
use crate::config::worker::{Worker, validate_workers};
use crate::coordinator::CoordinatorOptions;
use crate::miner::capacity::{CapacityLimits, DeviceInventory};
use crate::network::connection::ConnectionSettings;
use crate::network::retry::RetryPolicy;
use crate::network::stratum::Transport;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to run a coordinator: algorithm selection,
/// capacity limits, engine tuning, reconnect policy, session timing and the
/// pool workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Mining algorithm to use (e.g., "randomx", "cryptonight-v7")
    #[serde(default = "default_algorithm")]
    pub algorithm: AlgorithmType,

    /// How much of the machine mining may use
    #[serde(default)]
    pub limits: CapacityLimits,

    /// Hash engine tuning
    #[serde(default)]
    pub engine: EngineSettings,

    /// Reconnect backoff for transient pool failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Session timing and thresholds
    #[serde(default)]
    pub session: SessionSettings,

    /// Pool workers (`[[workers]]` tables)
    #[serde(default)]
    pub workers: Vec<Worker>,
}

/// Hash engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Nonces per work unit
    /// (default: 16)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// CPU cores to spread lanes over
    /// (default: 0 = number of CPU cores)
    #[serde(default)]
    pub cpu_units: usize,

    /// Accelerator units to spread accelerator lanes over
    /// (default: 0 = none)
    #[serde(default)]
    pub accelerator_units: usize,

    /// Full RandomX dataset (~2 GB, faster) instead of light mode
    #[serde(default)]
    pub randomx_fast: bool,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Rejected shares that stop a worker
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: u64,

    /// Seconds between keep-alive requests
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Seconds `stop` waits for outstanding share acknowledgements
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,

    /// Pool framing: "tcp" (newline-delimited JSON, TLS for secure
    /// workers) or "websocket"
    #[serde(default)]
    pub transport: Transport,

    /// Seconds allowed for connecting to a pool
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds between stats log lines (0 disables)
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Hash-rate averaging window in seconds
    #[serde(default = "default_hashrate_window_secs")]
    pub hashrate_window_secs: u64,

    /// Tokio worker threads for pool I/O
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

fn default_algorithm() -> AlgorithmType {
    AlgorithmType::RandomX
}

fn default_batch_size() -> u32 {
    16
}

fn default_reject_threshold() -> u64 {
    10
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_flush_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_report_interval_secs() -> u64 {
    60
}

fn default_hashrate_window_secs() -> u64 {
    10
}

fn default_io_threads() -> usize {
    2
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            batch_size: default_batch_size(),
            cpu_units: 0,
            accelerator_units: 0,
            randomx_fast: false,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            reject_threshold: default_reject_threshold(),
            keepalive_secs: default_keepalive_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
            transport: Transport::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            report_interval_secs: default_report_interval_secs(),
            hashrate_window_secs: default_hashrate_window_secs(),
            io_threads: default_io_threads(),
        }
    }
}

impl SessionSettings {
    /// Pool connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: default_algorithm(),
            limits: CapacityLimits::default(),
            engine: EngineSettings::default(),
            retry: RetryPolicy::default(),
            session: SessionSettings::default(),
            workers: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(MinerError)` - If file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything a coordinator would reject
    ///
    /// # Errors
    /// `MinerError::ConfigError` describing the first problem found
    pub fn validate(&self) -> Result<(), MinerError> {
        self.limits.validate()?;
        validate_workers(&self.workers)?;

        if self.engine.batch_size == 0 {
            return Err(MinerError::ConfigError("engine.batch_size must be > 0".into()));
        }
        if self.session.reject_threshold == 0 {
            return Err(MinerError::ConfigError(
                "session.reject_threshold must be > 0".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(MinerError::ConfigError(format!(
                "retry.multiplier must be >= 1, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    /// Coordinator options derived from the engine, retry and session sections
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        let session = &self.session;
        CoordinatorOptions {
            batch_size: self.engine.batch_size,
            inventory: DeviceInventory::detect(self.engine.cpu_units, self.engine.accelerator_units),
            reject_threshold: session.reject_threshold,
            connection: ConnectionSettings {
                retry: self.retry.clone(),
                keepalive: Duration::from_secs(session.keepalive_secs.max(1)),
                flush_timeout: Duration::from_secs(session.flush_timeout_secs),
                ..ConnectionSettings::default()
            },
            hashrate_window: Duration::from_secs(session.hashrate_window_secs.max(1)),
            report_interval: (session.report_interval_secs > 0)
                .then(|| Duration::from_secs(session.report_interval_secs)),
            io_threads: session.io_threads.max(1),
        }
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# xmr_kit-rs configuration\n\n");
        template.push_str("# Supported algorithms: randomx, cryptonight, cryptonight-v7, cryptonight-r\n");
        template.push_str("algorithm = \"randomx\"\n\n");

        template.push_str("[limits]\n");
        template.push_str("# Fraction of all CPU cores to use (0..=1)\n");
        template.push_str("cpu_limit = 1.0\n");
        template.push_str("# Fraction of accelerator units to use (0..=1)\n");
        template.push_str("accelerator_limit = 0.0\n\n");

        template.push_str("[engine]\n");
        template.push_str("# Nonces per work unit\n");
        template.push_str("batch_size = 16\n");
        template.push_str("# CPU cores (0 = auto-detect)\n");
        template.push_str("cpu_units = 0\n");
        template.push_str("accelerator_units = 0\n");
        template.push_str("# Full RandomX dataset (~2 GB) instead of light mode\n");
        template.push_str("randomx_fast = false\n\n");

        template.push_str("[retry]\n");
        template.push_str("initial_delay_ms = 1000\n");
        template.push_str("max_delay_ms = 60000\n");
        template.push_str("multiplier = 2.0\n");
        template.push_str("# max_attempts = 10\n\n");

        template.push_str("[session]\n");
        template.push_str("reject_threshold = 10\n");
        template.push_str("keepalive_secs = 60\n");
        template.push_str("flush_timeout_secs = 5\n");
        template.push_str("# \"tcp\" (TLS when a worker is secure) or \"websocket\"\n");
        template.push_str("transport = \"tcp\"\n");
        template.push_str("connect_timeout_secs = 10\n");
        template.push_str("# 0 disables the periodic stats line\n");
        template.push_str("report_interval_secs = 60\n");
        template.push_str("hashrate_window_secs = 10\n\n");

        template.push_str("# One table per pool worker; weight sets its share of the machine\n");
        template.push_str("[[workers]]\n");
        template.push_str("identifier = \"default\"\n");
        template.push_str("pool_host = \"pool.example.com\"\n");
        template.push_str("pool_port = 7777\n");
        template.push_str("secure = false\n");
        template.push_str("nicehash = false\n");
        template.push_str("wallet_address = \"your_wallet_address\"\n");
        template.push_str("password = \"x\"\n");
        template.push_str("weight = 1.0\n");

        template
    }
}
