// src/utils/logging.rs
//! Logging configuration and utilities
//!
//! The library only talks to the `log` facade. Binaries pick a backend here:
//! `env_logger` with a compact format that carries the thread name, so lane
//! threads and pool tasks can be told apart in the output.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for mining sessions
///
/// Default level is Info; `RUST_LOG` overrides it when set.
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Configures benchmark-specific logging
///
/// Same format as [`init_logging`] but defaults to Debug so per-thread
/// throughput lines show up.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else {
        builder.filter_level(level);
    }

    // A second init (tests, embedding apps) keeps the first logger.
    let _ = builder.try_init();
}

/// Base builder: `[ts level thread module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let thread = std::thread::current();

            writeln!(
                buf,
                "[{} {:<5} {} {}:{}] {}",
                ts,
                record.level(),
                thread.name().unwrap_or("-"),
                record.module_path().unwrap_or_default(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
