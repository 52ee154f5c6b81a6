//! Remote region ranking.
//!
//! An optional external service that, given the current position and the
//! user's interest tags, returns a ranked list of regions worth monitoring.
//! The ranking algorithm itself is opaque to this crate.
//!
//! # Failure Semantics
//!
//! Ranking calls are network I/O and may fail or hang. The coordinator bounds
//! every call with its own timeout and treats any error as a failed refresh
//! cycle: the current selection stays registered, refresh state is not
//! advanced, and the next trigger retries.

mod http;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPoint;
use crate::BoxFuture;

pub use http::{HttpRankingClient, RankingRequest, RankingResponse, DEFAULT_RANKING_TIMEOUT};

/// One candidate returned by the ranking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRegion {
    /// Location identifier.
    pub id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Suggested trigger radius in meters.
    #[serde(default)]
    pub radius_meters: Option<f64>,
    /// Ranking score; higher is more relevant.
    #[serde(default)]
    pub priority: f64,
}

impl RankedRegion {
    /// Create a ranked region.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, priority: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            radius_meters: None,
            priority,
        }
    }

    /// Set the suggested radius.
    pub fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = Some(radius_meters);
        self
    }

    /// Center of the region, if valid.
    pub fn center(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.latitude, self.longitude);
        point.is_valid().then_some(point)
    }
}

/// Errors from the ranking service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RankingError {
    /// Transport-level failure (DNS, connect, TLS, reset).
    #[error("Ranking request failed: {0}")]
    Http(String),

    /// Service answered with a non-success status.
    #[error("Ranking service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("Invalid ranking response: {0}")]
    Decode(String),

    /// The call did not finish within the allowed time.
    #[error("Ranking request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Client is not usable (misconfigured or shut down).
    #[error("Ranking service unavailable: {0}")]
    Unavailable(String),
}

/// External ranking service.
///
/// # Dyn Compatibility
///
/// Uses [`BoxFuture`] so implementations can be held as
/// `Arc<dyn RegionRankingClient>`.
pub trait RegionRankingClient: Send + Sync {
    /// Rank candidate regions around `position`.
    ///
    /// # Arguments
    ///
    /// * `position` - Current position
    /// * `interest_tags` - Tags the user holds, sorted
    /// * `max_results` - Upper bound on returned entries (the monitor capacity)
    fn rank<'a>(
        &'a self,
        position: GeoPoint,
        interest_tags: &'a [String],
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<RankedRegion>, RankingError>>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn RegionRankingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionRankingClient({})", self.name())
    }
}
