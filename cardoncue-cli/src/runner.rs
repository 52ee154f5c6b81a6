//! Shared setup for commands that run the geofence core.

use std::path::{Path, PathBuf};

use cardoncue::config::{config_file_path, ConfigFile};
use cardoncue::logging::{init_logging, WorkerGuard};
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load configuration and install the tracing subscriber.
    ///
    /// `config_path` overrides the default `~/.cardoncue/config.ini`;
    /// `log_level` overrides `[logging] level`.
    pub fn new(config_path: Option<&Path>, log_level: Option<&str>) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let level = log_level.unwrap_or(&config.logging.level);
        let log_guard = init_logging(level, config.logging.directory.as_deref())?;

        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Build a multi-threaded Tokio runtime.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::RuntimeCreation(e.to_string()))
    }

    /// Log the command being run and where its settings came from.
    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = cardoncue::VERSION,
            command,
            config = %self.config_path.display(),
            "CardOnCue starting"
        );
    }
}
