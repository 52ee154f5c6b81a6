//! Refresh state and the pure refresh decision.

use std::time::Duration;

use tokio::time::Instant;

use crate::geo::GeoPoint;

/// Default distance the user must move before the selection is recomputed.
pub const DEFAULT_DISTANCE_THRESHOLD_METERS: f64 = 500.0;

/// Default maximum age of a selection (6 hours).
pub const DEFAULT_TIME_THRESHOLD: Duration = Duration::from_secs(6 * 60 * 60);

/// Refresh bookkeeping owned by the coordinator.
///
/// `current_position` follows every accepted position update. The two
/// `last_refresh_*` fields are only ever written together, after a refresh
/// cycle completed its reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RefreshState {
    /// Position the current selection was computed for.
    pub last_refresh_location: Option<GeoPoint>,
    /// When the current selection was committed.
    pub last_refresh_at: Option<Instant>,
    /// Most recent known position.
    pub current_position: Option<GeoPoint>,
}

impl RefreshState {
    /// Create an empty state (no refresh has happened yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new position.
    pub fn update_position(&mut self, position: GeoPoint) {
        self.current_position = Some(position);
    }

    /// Commit a completed refresh computed at `location`.
    pub fn commit_refresh(&mut self, location: GeoPoint, at: Instant) {
        self.last_refresh_location = Some(location);
        self.last_refresh_at = Some(at);
    }

    /// Distance moved since the last refresh, if both positions are known.
    pub fn distance_since_refresh_m(&self) -> Option<f64> {
        let current = self.current_position?;
        let last = self.last_refresh_location?;
        Some(current.distance_to(&last))
    }
}

/// Why a refresh is (or was) due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshTrigger {
    /// No refresh has been committed yet.
    FirstRefresh,
    /// Stationary dwell reported by the location source.
    Visit,
    /// Moved at least the distance threshold (meters moved).
    DistanceMoved(f64),
    /// The time threshold elapsed (time since last refresh).
    TimeElapsed(Duration),
    /// Requested explicitly through `force_refresh`.
    Manual,
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshTrigger::FirstRefresh => write!(f, "first-refresh"),
            RefreshTrigger::Visit => write!(f, "visit"),
            RefreshTrigger::DistanceMoved(m) => write!(f, "moved {:.0}m", m),
            RefreshTrigger::TimeElapsed(d) => write!(f, "stale after {}s", d.as_secs()),
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Distance and time hysteresis for refreshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshPolicy {
    /// Movement that forces a refresh, in meters.
    pub distance_threshold_meters: f64,
    /// Selection age that forces a refresh.
    pub time_threshold: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            distance_threshold_meters: DEFAULT_DISTANCE_THRESHOLD_METERS,
            time_threshold: DEFAULT_TIME_THRESHOLD,
        }
    }
}

impl RefreshPolicy {
    /// Create a policy with explicit thresholds.
    pub fn new(distance_threshold_meters: f64, time_threshold: Duration) -> Self {
        Self {
            distance_threshold_meters,
            time_threshold,
        }
    }

    /// Returns `true` if the monitored set should be recomputed now.
    ///
    /// # Arguments
    ///
    /// * `state` - Current refresh bookkeeping
    /// * `now` - Current time
    /// * `visit` - Whether this evaluation was caused by a visit event
    pub fn should_refresh(&self, state: &RefreshState, now: Instant, visit: bool) -> bool {
        self.evaluate(state, now, visit).is_some()
    }

    /// Like [`should_refresh`](Self::should_refresh) but reports which rule fired.
    pub fn evaluate(
        &self,
        state: &RefreshState,
        now: Instant,
        visit: bool,
    ) -> Option<RefreshTrigger> {
        let Some(last_location) = state.last_refresh_location else {
            return Some(RefreshTrigger::FirstRefresh);
        };

        if visit {
            return Some(RefreshTrigger::Visit);
        }

        if let Some(current) = state.current_position {
            let moved = current.distance_to(&last_location);
            if moved >= self.distance_threshold_meters {
                return Some(RefreshTrigger::DistanceMoved(moved));
            }
        }

        match state.last_refresh_at {
            Some(last_at) => {
                let elapsed = now.saturating_duration_since(last_at);
                (elapsed >= self.time_threshold).then_some(RefreshTrigger::TimeElapsed(elapsed))
            }
            // Location without a timestamp cannot come from commit_refresh;
            // treat it as stale rather than waiting forever.
            None => Some(RefreshTrigger::TimeElapsed(Duration::ZERO)),
        }
    }
}
