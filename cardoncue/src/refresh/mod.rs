//! Refresh gating for the monitored-region set.
//!
//! Decides whether the selection should be recomputed right now, using
//! hysteresis on two axes plus an explicit dwell signal:
//!
//! ```text
//! no previous refresh          ──► FirstRefresh
//! visit (stationary dwell)     ──► Visit
//! moved >= distance threshold  ──► DistanceMoved
//! waited >= time threshold     ──► TimeElapsed
//! otherwise                    ──► no refresh
//! ```
//!
//! The policy is a pure function of [`RefreshState`] and the current time, so
//! it is tested without any runtime.

mod policy;

pub use policy::{
    RefreshPolicy, RefreshState, RefreshTrigger, DEFAULT_DISTANCE_THRESHOLD_METERS,
    DEFAULT_TIME_THRESHOLD,
};
