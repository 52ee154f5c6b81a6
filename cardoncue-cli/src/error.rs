//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use cardoncue::config::ConfigError;
use cardoncue::logging::LoggingError;
use cardoncue::{CoordinatorError, RankingError};

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or unreadable configuration.
    Config(String),

    /// Configuration file could not be loaded or saved.
    ConfigFile(ConfigError),

    /// Logging could not be initialized.
    Logging(LoggingError),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),

    /// An input file could not be read.
    Input { path: PathBuf, source: std::io::Error },

    /// An input file is not valid JSON.
    Parse { path: PathBuf, message: String },

    /// The coordinator rejected a command or shut down.
    Coordinator(CoordinatorError),

    /// The ranking client could not be built.
    Ranking(RankingError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::RuntimeCreation(msg) => {
                write!(f, "Failed to create Tokio runtime: {}", msg)
            }
            CliError::Input { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            CliError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            CliError::Coordinator(e) => write!(f, "Coordinator error: {}", e),
            CliError::Ranking(e) => write!(f, "Ranking client error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Input { source, .. } => Some(source),
            CliError::Coordinator(e) => Some(e),
            CliError::Ranking(e) => Some(e),
            CliError::Config(_) | CliError::RuntimeCreation(_) | CliError::Parse { .. } => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<CoordinatorError> for CliError {
    fn from(e: CoordinatorError) -> Self {
        CliError::Coordinator(e)
    }
}

impl From<RankingError> for CliError {
    fn from(e: RankingError) -> Self {
        CliError::Ranking(e)
    }
}
