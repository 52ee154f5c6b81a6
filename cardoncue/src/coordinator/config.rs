//! Runtime configuration for the geofence coordinator.
//!
//! All knobs have in-code defaults matching the platform limits the system
//! was designed around. The INI file layer in [`crate::config`] produces a
//! [`GeofenceConfig`] through [`ConfigFile::to_geofence_config`](crate::config::ConfigFile::to_geofence_config).
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [geofence]
//! max_regions = 20
//! distance_threshold_m = 500
//! time_threshold_secs = 21600
//! default_radius_m = 100
//! # Optional: ignore fixes coarser than this
//! max_accuracy_m = 5000
//! ```

use std::time::Duration;

use crate::location::DEFAULT_RADIUS_METERS;
use crate::ranking::DEFAULT_RANKING_TIMEOUT;
use crate::refresh::{RefreshPolicy, DEFAULT_DISTANCE_THRESHOLD_METERS, DEFAULT_TIME_THRESHOLD};
use crate::selector::{RegionSelector, DEFAULT_MAX_CONCURRENT_REGIONS};

/// Capacity of the region event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the coordinator command channel.
pub const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Configuration for [`GeofenceCoordinator`](super::GeofenceCoordinator).
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceConfig {
    /// Maximum number of concurrently monitored regions.
    pub max_concurrent_regions: usize,

    /// Movement since the last refresh that triggers a new one, in meters.
    pub distance_threshold_meters: f64,

    /// Maximum age of a selection before it is recomputed.
    pub time_threshold: Duration,

    /// Radius used when a location's own radius is unusable.
    pub default_radius_meters: f64,

    /// Position updates with a worse horizontal accuracy are ignored.
    ///
    /// `None` (the default) accepts every fix with a non-negative accuracy,
    /// including coarse cell-tower fixes.
    pub max_position_accuracy_meters: Option<f64>,

    /// Upper bound on a single ranking-service call.
    pub ranking_timeout: Duration,

    /// Buffered region events per subscriber before lagging.
    pub event_channel_capacity: usize,

    /// Buffered commands from coordinator handles.
    pub command_channel_capacity: usize,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_regions: DEFAULT_MAX_CONCURRENT_REGIONS,
            distance_threshold_meters: DEFAULT_DISTANCE_THRESHOLD_METERS,
            time_threshold: DEFAULT_TIME_THRESHOLD,
            default_radius_meters: DEFAULT_RADIUS_METERS,
            max_position_accuracy_meters: None,
            ranking_timeout: DEFAULT_RANKING_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
        }
    }
}

impl GeofenceConfig {
    /// Set the monitoring budget.
    pub fn with_max_concurrent_regions(mut self, max: usize) -> Self {
        self.max_concurrent_regions = max;
        self
    }

    /// Set the distance threshold.
    pub fn with_distance_threshold(mut self, meters: f64) -> Self {
        self.distance_threshold_meters = meters;
        self
    }

    /// Set the time threshold.
    pub fn with_time_threshold(mut self, threshold: Duration) -> Self {
        self.time_threshold = threshold;
        self
    }

    /// Set the fallback region radius.
    pub fn with_default_radius(mut self, meters: f64) -> Self {
        self.default_radius_meters = meters;
        self
    }

    /// Set (or disable) the accuracy filter for position updates.
    pub fn with_max_position_accuracy(mut self, meters: Option<f64>) -> Self {
        self.max_position_accuracy_meters = meters;
        self
    }

    /// Set the ranking-service timeout.
    pub fn with_ranking_timeout(mut self, timeout: Duration) -> Self {
        self.ranking_timeout = timeout;
        self
    }

    /// The refresh policy described by this configuration.
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(self.distance_threshold_meters, self.time_threshold)
    }

    /// The selector described by this configuration.
    pub fn selector(&self) -> RegionSelector {
        RegionSelector::new(self.max_concurrent_regions).with_default_radius(self.default_radius_meters)
    }

    /// Returns `true` if a fix with this horizontal accuracy should be used.
    ///
    /// Negative accuracy marks an invalid fix and is always rejected.
    pub fn accepts_accuracy(&self, accuracy_meters: f64) -> bool {
        if accuracy_meters.is_nan() || accuracy_meters < 0.0 {
            return false;
        }
        match self.max_position_accuracy_meters {
            Some(max) => accuracy_meters <= max,
            None => true,
        }
    }
}
