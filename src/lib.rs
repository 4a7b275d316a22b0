//! Core of a Robot Operating System for a wheeled robot: an async message
//! bus with priority arbitration, a component lifecycle model, a macro
//! scheduler, and a motor control pipeline (slew -> PID -> jerk -> driver).
//!
//! Process bootstrap (logging, signal handling, globals) is kept here;
//! the `krosd` binary in `src/main.rs` is the thin entry point that calls
//! into it.

pub mod arbitrator;
pub mod bus;
pub mod comm;
pub mod component;
pub mod config;
pub mod dequeue;
pub mod error;
pub mod event;
pub mod external_clock;
pub mod globals;
pub mod jerk;
pub mod macro_publisher;
pub mod macros;
pub mod motor;
pub mod motor_controller;
pub mod orient;
pub mod pid;
pub mod queue;
pub mod slew;
pub mod tasks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use once_cell::sync::{Lazy, OnceCell};

pub const NAME: &str = "krosd";
pub const DESCRIPTION: &str = "Core of a Robot Operating System";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static STARTUP_TIME: OnceCell<std::time::Instant> = OnceCell::new();

/// Set once by [`register_signals`]; polled by the main loop to decide when
/// to begin graceful shutdown on SIGHUP/SIGTERM/SIGINT.
static SHUTDOWN_FLAG: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

#[must_use]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_FLAG.load(Ordering::SeqCst)
}

#[must_use]
pub fn uptime() -> std::time::Duration {
    STARTUP_TIME.get().map_or(std::time::Duration::ZERO, std::time::Instant::elapsed)
}

/// Initializes logging per the `logging` config section, selecting
/// between an stdout env-filtered logger and a syslog backend.
///
/// # Panics
///
/// Panics if `target` is `Syslog` and the local syslog socket cannot be
/// reached: a broken logging backend is treated as a startup-time fatal
/// error rather than silently falling back.
pub fn init_logging(config: &config::LoggingConfig) {
    STARTUP_TIME.get_or_init(std::time::Instant::now);
    let level = config
        .level
        .as_deref()
        .and_then(|s| s.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    match config.target {
        Some(config::LogTarget::Syslog) => {
            let formatter = syslog::Formatter3164 {
                facility: syslog::Facility::LOG_USER,
                hostname: None,
                process: NAME.to_owned(),
                pid: std::process::id(),
            };
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
                syslog::unix(formatter).expect("connect to local syslog socket"),
            )))
            .expect("install syslog logger");
            log::set_max_level(level);
        }
        _ => {
            env_logger::Builder::new()
                .target(env_logger::Target::Stdout)
                .filter_level(level)
                .init();
        }
    }
    debug!("{NAME} {VERSION}: log initialization completed");
}

/// Installs SIGHUP/SIGTERM/SIGINT handlers that flip [`shutdown_requested`]
/// via `signal-hook`. SIGHUP is treated the same as SIGTERM: this daemon
/// has no live-reload path, so a reload request degrades to a graceful
/// shutdown.
///
/// # Panics
///
/// Panics if `signal-hook` cannot register with the kernel: a process
/// that cannot observe its own shutdown signal must not pretend to
/// function.
pub fn register_signals() {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&SHUTDOWN_FLAG))
        .expect("register SIGTERM handler");
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&SHUTDOWN_FLAG))
        .expect("register SIGINT handler");
    signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&SHUTDOWN_FLAG))
        .expect("register SIGHUP handler");
}

#[must_use]
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
