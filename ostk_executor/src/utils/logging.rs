//! # Logging Initialization
//!
//! Centralized setup of the `tracing` subscriber for the `ostk_executor`
//! binary. Worker processes do not use this module; they install
//! [`crate::worker::InterceptLayer`] so their logs travel back to the executor
//! as events.
//!
//! ## Logging Configuration
//!
//! 1.  **Environment Filter (`EnvFilter`)**: verbosity comes from `RUST_LOG`.
//!     Without it, the given level applies to everything and `debug` to this
//!     crate.
//!
//! 2.  **File Logging (Default)**: a daily rolling log file in the user cache
//!     directory (via `directories`), written through a non-blocking
//!     `tracing_appender` writer, without ANSI colors.
//!
//! 3.  **Stderr Logging (Opt-in)**: with `log_to_file = false`, logs go to
//!     `stderr` with ANSI colors.
//!
//! 4.  **Stderr Fallback**: if the cache directory cannot be determined or is
//!     not writable, logs go to `stderr`.
//!
//! ## Usage
//!
//! For terminal debugging: `init_logging("debug", false)`
//! For normal runs: `init_logging("info", true)`

use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    init_logging("trace", false);
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(log_level: &str) -> String {
    format!("{log_level},ostk_executor=debug")
}

/// Initializes the logging system.
///
/// Safe to call more than once; only the first call has an effect. Never
/// fails: without a writable cache directory logs go to stderr, and an
/// already installed subscriber is kept.
pub fn init_logging(log_level: &str, log_to_file: bool) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

        if log_to_file
            && let Some(proj_dirs) = ProjectDirs::from("org", "OpenSky", "ostk_executor")
        {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics on permission errors.
            let file_appender_result = if test_write_permission(log_dir) {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tracing_appender::rolling::daily(log_dir, "ostk_executor.log")
                }))
            } else {
                Err(Box::new("Cannot write to log directory") as Box<dyn std::any::Any + Send>)
            };

            if let Ok(file_appender) = file_appender_result {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .try_init();
                // Leaked so buffered lines are flushed at exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        // Another subscriber may already be installed (tests); keep it.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .try_init();
    });
}

/// Create `dir` if needed and check that a file can be written inside it.
fn test_write_permission(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let test_file = dir.join(".ostk_log_test");
    match std::fs::write(&test_file, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&test_file);
            true
        }
        Err(_) => false,
    }
}
