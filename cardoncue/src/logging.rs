//! Tracing subscriber setup.
//!
//! Console output goes to stderr. When a log directory is given, events are
//! also written to a daily-rolling file through a non-blocking writer; keep
//! the returned guard alive for as long as logs should be flushed.
//!
//! `RUST_LOG` overrides the configured level when set.

use std::path::Path;

use thiserror::Error;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Prefix of rolling log files (`cardoncue.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "cardoncue.log";

/// Errors from logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory: {0}")]
    Directory(#[from] std::io::Error),

    /// The level string is not a valid filter directive.
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Build the level filter: `RUST_LOG` if set, otherwise `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| LoggingError::Filter {
            filter: level.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Install the global subscriber.
///
/// # Arguments
///
/// * `level` - Default filter directive, e.g. `info` or `cardoncue=debug`
/// * `log_dir` - Optional directory for daily-rolling log files
///
/// # Returns
///
/// The file writer guard when file logging is enabled.
pub fn init_logging(
    level: &str,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(level)?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    if let Some(dir) = log_dir {
        tracing::debug!(directory = %dir.display(), "File logging enabled");
    }

    Ok(guard)
}
