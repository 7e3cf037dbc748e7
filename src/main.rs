// src/main.rs
use clap::Parser;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use xmr_kit_rs::cli::{self, Action};
use xmr_kit_rs::miner::{MiningJob, algorithm};
use xmr_kit_rs::utils::init_bench_logging;
use xmr_kit_rs::*;

/// Main entry point for the xmr_kit miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        Action::Start(opts) => start_mining(opts),
        Action::Benchmark(opts) => run_benchmark(opts),
        Action::Config(opts) => generate_config(opts),
    }
}

/// Logs every coordinator callback
struct LogDelegate;

impl MinerDelegate for LogDelegate {
    fn accepted_result(&self, count: u64, worker_id: &str) {
        log::info!("[{}] accepted result #{}", worker_id, count);
    }

    fn difficulty_changed(&self, difficulty: u64, worker_id: &str) {
        log::info!("[{}] difficulty changed to {}", worker_id, difficulty);
    }

    fn block_found(&self, worker_id: &str) {
        log::info!("[{}] block found!", worker_id);
    }

    fn mining_error(&self, error: &MinerError, stopped: bool) {
        if stopped {
            log::error!("Mining error (worker stopped): {}", error);
        } else {
            log::warn!("Mining error: {}", error);
        }
    }
}

/// Starts mining with the given options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads the configuration and applies CLI overrides
/// 3. Starts the coordinator and prints the hash rate once per second
/// 4. Stops on Ctrl-C or once no worker is left, flushing in-flight shares
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(cpu_limit) = opts.cpu_limit {
        config.limits.cpu_limit = cpu_limit;
    }
    if let Some(accelerator_limit) = opts.accelerator_limit {
        config.limits.accelerator_limit = accelerator_limit;
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo;
    }

    let coordinator = Arc::new(MiningCoordinator::from_config(&config)?);
    let delegate: Arc<dyn MinerDelegate> = Arc::new(LogDelegate);
    coordinator.set_delegate(Some(delegate));
    coordinator.start()?;
    let interrupted = watch_ctrl_c()?;

    log::info!(
        "Mining {} with {} worker(s)",
        config.algorithm,
        config.workers.len()
    );
    while coordinator.is_active() && !interrupted.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
        println!("Hash rate: {:.2} H/s", coordinator.hash_rate());
    }

    coordinator.stop();
    Ok(())
}

/// Flag that flips on Ctrl-C
fn watch_ctrl_c() -> Result<Arc<AtomicBool>, MinerError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                log::info!("Interrupted, stopping");
                flag.store(true, Ordering::SeqCst);
            }
        })?;
    Ok(interrupted)
}

/// Runs mining algorithm benchmarks
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Creates and prepares the algorithm
/// 3. Hashes on a rayon pool until the duration elapses
/// 4. Reports the aggregate hash rate
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let algorithm = algorithm::create(opts.algorithm, opts.fast);
    let mut job = MiningJob::new("benchmark", vec![0u8; 76], u64::MAX)?;
    job.seed_hash = Some(vec![0u8; 32]);
    algorithm.prepare(&job)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads.max(1))
        .thread_name(|i| format!("bench-{}", i))
        .build()
        .map_err(|e| MinerError::TaskError(format!("Cannot build thread pool: {}", e)))?;

    log::info!(
        "Starting {} benchmark for {} seconds on {} threads",
        opts.algorithm,
        opts.duration,
        opts.threads
    );

    let meter = HashRateMeter::default();
    let deadline = Duration::from_secs(opts.duration);
    let start_time = Instant::now();
    let errors: usize = pool.install(|| {
        (0..opts.threads.max(1) as u32)
            .into_par_iter()
            .map(|lane| {
                let mut blob = job.blob.clone();
                let mut nonce = lane << 24;
                let mut last_log = Instant::now();
                let mut hashes = 0u64;
                let mut errors = 0;

                while start_time.elapsed() < deadline {
                    MiningJob::write_nonce(&mut blob, nonce);
                    if algorithm.hash_job(&job, &blob).is_err() {
                        errors += 1;
                    }
                    nonce = nonce.wrapping_add(1);
                    hashes += 1;
                    meter.record(1);

                    // Log progress every second
                    if last_log.elapsed().as_secs() >= 1 {
                        log::debug!(
                            "Lane {}: {:.1} H/s",
                            lane,
                            hashes as f64 / last_log.elapsed().as_secs_f64()
                        );
                        hashes = 0;
                        last_log = Instant::now();
                    }
                }
                errors
            })
            .sum()
    });

    // Report final results
    let elapsed = start_time.elapsed().as_secs_f64().max(f64::EPSILON);
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", meter.total());
    log::info!("Average hashrate: {:.2} H/s", meter.total() as f64 / elapsed);
    if errors > 0 {
        log::warn!("{} hashes failed", errors);
    }
    log::logger().flush();

    Ok(())
}

/// Writes the configuration template
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    if opts.output.exists() && !opts.force {
        return Err(MinerError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            opts.output.display()
        )));
    }
    std::fs::write(&opts.output, config::generate_template())?;
    println!("Wrote {}", opts.output.display());
    Ok(())
}
