//! Coordinator errors.

use thiserror::Error;

use crate::ranking::RankingError;

/// Errors returned by [`GeofenceCoordinator`](super::GeofenceCoordinator) commands.
///
/// Transient failures inside a refresh cycle are not errors at this level;
/// they are reported through [`RefreshOutcome::Failed`](super::RefreshOutcome::Failed).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// `start` was called while already monitoring.
    #[error("Coordinator is already started")]
    AlreadyStarted,

    /// The command requires a started coordinator.
    #[error("Coordinator is not running")]
    NotRunning,

    /// The coordinator task has exited.
    #[error("Coordinator has shut down")]
    ShutDown,
}

/// Why a refresh cycle did not complete.
///
/// A failed cycle leaves the monitored set and refresh state as they were.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RefreshError {
    /// The ranking service failed or timed out.
    #[error(transparent)]
    Ranking(#[from] RankingError),

    /// The refresh task ended abnormally.
    #[error("Refresh task failed: {0}")]
    Task(String),
}
