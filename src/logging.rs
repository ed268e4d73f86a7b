//! Logging initialization.
//!
//! Stdout carries the verdict read by shell hooks, so diagnostics go to
//! stderr or to the file named by `logging.file`. `RUST_LOG` takes
//! precedence over the configured level.

use crate::config::{expand_path, ConfigError, LoggingConfig};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the program.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = &config.file {
        let path = expand_path(path);

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Warning: Failed to create log directory: {}", e);
            }
        }

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(log_file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

                let file_layer = fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true);

                if let Err(e) = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .try_init()
                {
                    eprintln!("Warning: Failed to initialize logging: {}", e);
                    return None;
                }

                return Some(guard);
            }
            Err(e) => {
                eprintln!("Warning: Failed to open log file {}: {}", path.display(), e);
            }
        }
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
    {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    None
}

/// Report a config file that failed to load
///
/// Call after [`init_logging`] so the warning reaches a subscriber.
pub fn report_config_error(path: Option<&Path>, error: &ConfigError) {
    match path {
        Some(path) => tracing::warn!(
            path = %path.display(),
            error = %error,
            "failed to load config, using defaults"
        ),
        None => tracing::warn!(error = %error, "failed to load config, using defaults"),
    }
}
