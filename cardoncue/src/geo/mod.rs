//! Geographic primitives.
//!
//! Provides the WGS84 point type shared by every other module and the
//! great-circle distance used for both selection ranking and refresh gating.
//!
//! Distances use the haversine formula on a spherical earth. The error versus
//! an ellipsoidal model is well under 0.5%, which is far below the hundreds of
//! meters the refresh thresholds are measured in.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point. No validation is performed; see [`GeoPoint::is_valid`].
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (MIN_LAT..=MAX_LAT).contains(&self.latitude)
            && (MIN_LON..=MAX_LON).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters.
    #[inline]
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(*self, *other)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}°, {:.5}°", self.latitude, self.longitude)
    }
}

/// Haversine great-circle distance between two points, in meters.
///
/// # Arguments
///
/// * `a` - First point (degrees)
/// * `b` - Second point (degrees)
#[inline]
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    // Clamp guards against h drifting just past 1.0 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Offset a point by a distance north and east, in meters.
///
/// Uses an equirectangular approximation, which is accurate to well under a
/// meter for offsets of a few kilometers. Intended for building nearby test
/// fixtures and simulated tracks, not for navigation.
pub fn offset_m(origin: GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlon = (east_m / (EARTH_RADIUS_M * origin.latitude.to_radians().cos())).to_degrees();
    GeoPoint::new(origin.latitude + dlat, origin.longitude + dlon)
}
