//! # Logging Initialization
//!
//! Sets up the `tracing` subscriber for the `ferry` binary.
//!
//! - **Environment Filter (`EnvFilter`)**: verbosity comes from `RUST_LOG`. When it is
//!   unset, the given level applies to dependencies and `debug` to `ferry` itself.
//!
//! - **File Logging (Default)**: a daily rolling log file in the user cache directory
//!   (resolved with the `directories` crate), written through a non-blocking
//!   `tracing_appender` writer with ANSI colors disabled.
//!
//! - **Stderr Logging**: with `log_to_file = false`, or when the cache directory is
//!   unavailable or unwritable, logs go to stderr with colors.
//!
//! Stdout is never used for logs; the CLI prints its JSON reports there.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Initialize the global subscriber. Only the first call has any effect.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},ferry=debug")));

        if log_to_file
            && let Some(proj_dirs) = ProjectDirs::from("dev", "Ferry", "ferry")
        {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics on permission errors.
            let file_appender_result = if can_write_to(log_dir) {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tracing_appender::rolling::daily(log_dir, "ferry.log")
                }))
            } else {
                Err(Box::new("Cannot write to log directory") as Box<dyn std::any::Any + Send>)
            };

            if let Ok(file_appender) = file_appender_result {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                let installed = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .try_init()
                    .is_ok();
                if installed {
                    // Flushes on drop; keep it for the life of the process.
                    Box::leak(Box::new(guard));
                }
                return;
            }
        }

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .try_init();
    });

    Ok(())
}

/// Create `dir` if needed and probe it with a throwaway file.
fn can_write_to(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let probe = dir.join(".ferry_log_probe");
    match std::fs::write(&probe, "probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
