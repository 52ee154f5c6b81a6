//! Coordinator phase, status snapshots and refresh outcomes.

use std::fmt;
use std::time::Duration;

use super::RefreshError;
use crate::geo::GeoPoint;
use crate::monitor::ReconcileResult;
use crate::refresh::{RefreshState, RefreshTrigger};

/// Lifecycle phase of the coordinator.
///
/// ```text
///          start                 trigger
///  Idle ──────────► Monitoring ──────────► Refreshing
///   ▲                  ▲   │                   │
///   │      stop        │   └───── done ◄───────┘
///   └──────────────────┴──────── stop ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorPhase {
    /// Not subscribed, nothing monitored.
    #[default]
    Idle,
    /// Subscribed and waiting for a refresh trigger.
    Monitoring,
    /// A refresh cycle is in flight.
    Refreshing,
}

impl CoordinatorPhase {
    /// Returns `true` unless idle.
    pub fn is_running(&self) -> bool {
        !matches!(self, CoordinatorPhase::Idle)
    }
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorPhase::Idle => write!(f, "idle"),
            CoordinatorPhase::Monitoring => write!(f, "monitoring"),
            CoordinatorPhase::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Summary of a completed refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    /// Why the cycle ran.
    pub trigger: RefreshTrigger,
    /// Position the selection was computed for.
    pub position: GeoPoint,
    /// Where the ranking came from (`"local"` or the ranking client's name).
    pub source: &'static str,
    /// Selected ids, best first.
    pub selected: Vec<String>,
    /// Candidates with valid coordinates that were considered.
    pub considered: usize,
    /// Candidates skipped for invalid coordinates.
    pub skipped_invalid: usize,
    /// What reconcile changed.
    pub reconcile: ReconcileResult,
    /// Ids registered after the cycle.
    pub monitored: Vec<String>,
    /// Wall time spent in the cycle.
    pub duration: Duration,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} via {}: {} selected, {} monitored ({}) in {}ms",
            self.trigger,
            self.position,
            self.source,
            self.selected.len(),
            self.monitored.len(),
            self.reconcile,
            self.duration.as_millis()
        )
    }
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The cycle reconciled and committed.
    Completed(RefreshReport),
    /// The cycle failed; nothing was committed.
    Failed(RefreshError),
    /// No position is known yet; the first position update will refresh.
    Deferred,
    /// The coordinator stopped before the cycle finished.
    Cancelled,
}

impl RefreshOutcome {
    /// Returns `true` for [`RefreshOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, RefreshOutcome::Completed(_))
    }

    /// The report of a completed cycle.
    pub fn report(&self) -> Option<&RefreshReport> {
        match self {
            RefreshOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Completed(report) => write!(f, "completed: {}", report),
            RefreshOutcome::Failed(e) => write!(f, "failed: {}", e),
            RefreshOutcome::Deferred => write!(f, "deferred (no position yet)"),
            RefreshOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    /// Current phase.
    pub phase: CoordinatorPhase,
    /// Refresh bookkeeping.
    pub refresh_state: RefreshState,
    /// Ids registered as of the last completed cycle, sorted.
    pub monitored_ids: Vec<String>,
    /// Completed refresh cycles.
    pub refresh_cycles: u64,
    /// Failed refresh cycles.
    pub failed_cycles: u64,
    /// Failures since the last completed cycle.
    pub consecutive_failures: u32,
    /// Whether a follow-up refresh is queued behind the in-flight one.
    pub refresh_pending: bool,
    /// Name of the configured ranking client.
    pub ranking_client: Option<&'static str>,
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} regions, {} cycles ({} failed)",
            self.phase,
            self.monitored_ids.len(),
            self.refresh_cycles,
            self.failed_cycles
        )?;
        if let Some(position) = self.refresh_state.current_position {
            write!(f, ", at {}", position)?;
        }
        Ok(())
    }
}
