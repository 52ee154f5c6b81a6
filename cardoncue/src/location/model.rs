//! Core data types for saved locations and monitored regions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Default trigger radius for a location, in meters.
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

fn default_radius() -> f64 {
    DEFAULT_RADIUS_METERS
}

/// A saved place the user may want to be reminded about.
///
/// Owned by an external store. The geofence core only flips [`active`](Self::active)
/// after each refresh and stamps [`last_entry_at`](Self::last_entry_at) on entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOfInterest {
    /// Stable unique identifier (also used as the monitored region id).
    pub id: String,

    /// Optional display label (store or network name).
    #[serde(default)]
    pub name: Option<String>,

    /// Latitude in degrees. `None` when the location was imported without coordinates.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude in degrees. `None` when the location was imported without coordinates.
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Monitoring trigger radius in meters.
    #[serde(default = "default_radius")]
    pub radius_meters: f64,

    /// Cards or networks associated with this place.
    #[serde(default)]
    pub owner_tags: BTreeSet<String>,

    /// Whether this location is currently one of the monitored set.
    #[serde(default)]
    pub active: bool,

    /// Last time the user was observed entering this region.
    #[serde(default)]
    pub last_entry_at: Option<DateTime<Utc>>,
}

impl LocationOfInterest {
    /// Create a location at the given coordinates with the default radius.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            latitude: Some(latitude),
            longitude: Some(longitude),
            radius_meters: DEFAULT_RADIUS_METERS,
            owner_tags: BTreeSet::new(),
            active: false,
            last_entry_at: None,
        }
    }

    /// Create a location with no coordinates.
    pub fn without_coordinates(id: impl Into<String>) -> Self {
        Self {
            latitude: None,
            longitude: None,
            ..Self::new(id, 0.0, 0.0)
        }
    }

    /// Set the trigger radius.
    pub fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = radius_meters;
        self
    }

    /// Add an owner tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.owner_tags.insert(tag.into());
        self
    }

    /// Returns the coordinates if both are present and valid WGS84.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.latitude?, self.longitude?);
        point.is_valid().then_some(point)
    }

    /// Returns `true` if any owner tag is in `owned`.
    pub fn matches_any_tag<'a, I>(&self, owned: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        owned.into_iter().any(|tag| self.owner_tags.contains(tag))
    }

    /// Snapshot this location as a region ready for registration.
    ///
    /// Returns `None` if the coordinates are missing or invalid. A radius that
    /// is non-finite or not positive is replaced with `fallback_radius`.
    pub fn to_monitored_region(&self, fallback_radius: f64) -> Option<MonitoredRegion> {
        let center = self.coordinates()?;
        Some(MonitoredRegion::new(
            self.id.clone(),
            center,
            sanitize_radius(self.radius_meters, fallback_radius),
        ))
    }
}

/// Replace a non-finite or non-positive radius with `fallback`.
pub(crate) fn sanitize_radius(radius: f64, fallback: f64) -> f64 {
    if radius.is_finite() && radius > 0.0 {
        radius
    } else {
        fallback
    }
}

/// A region registered with the capacity-limited monitor.
///
/// Center and radius are copied at registration time. Changing the source
/// location later does not update a registered region; reconcile treats the
/// geometry change as a new region and re-registers it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredRegion {
    /// Region identifier (equal to the location id).
    pub region_id: String,
    /// Region center.
    pub center: GeoPoint,
    /// Trigger radius in meters.
    pub radius_meters: f64,
}

impl MonitoredRegion {
    /// Create a new monitored region.
    pub fn new(region_id: impl Into<String>, center: GeoPoint, radius_meters: f64) -> Self {
        Self {
            region_id: region_id.into(),
            center,
            radius_meters,
        }
    }

    /// Returns `true` if `other` describes the same circle.
    pub fn same_geometry(&self, other: &MonitoredRegion) -> bool {
        self.center == other.center && self.radius_meters == other.radius_meters
    }
}

/// Kind of a region event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionEventKind {
    /// User entered a monitored region.
    Enter,
    /// User left a monitored region.
    Exit,
    /// The platform could not monitor the region.
    MonitoringFailed,
}

impl std::fmt::Display for RegionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionEventKind::Enter => write!(f, "enter"),
            RegionEventKind::Exit => write!(f, "exit"),
            RegionEventKind::MonitoringFailed => write!(f, "monitoring-failed"),
        }
    }
}

/// Event published to the notification layer. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionEvent {
    /// What happened.
    pub kind: RegionEventKind,
    /// Region the event refers to.
    pub region_id: String,
    /// When the coordinator observed the event.
    pub timestamp: DateTime<Utc>,
    /// Failure description for `MonitoringFailed`.
    pub error: Option<String>,
    /// Resolved location record, when the store knows the id.
    pub location: Option<LocationOfInterest>,
}

impl RegionEvent {
    /// Create an event stamped with the current time.
    pub fn new(kind: RegionEventKind, region_id: impl Into<String>) -> Self {
        Self {
            kind,
            region_id: region_id.into(),
            timestamp: Utc::now(),
            error: None,
            location: None,
        }
    }

    /// Create a `MonitoringFailed` event.
    pub fn monitoring_failed(region_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(RegionEventKind::MonitoringFailed, region_id)
        }
    }

    /// Attach the resolved location record.
    pub fn with_location(mut self, location: Option<LocationOfInterest>) -> Self {
        self.location = location;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_present_and_valid() {
        let loc = LocationOfInterest::new("a", 40.0, -73.0);
        assert_eq!(loc.coordinates(), Some(GeoPoint::new(40.0, -73.0)));
    }

    #[test]
    fn test_coordinates_missing() {
        let loc = LocationOfInterest::without_coordinates("a");
        assert!(loc.coordinates().is_none());

        let mut half = LocationOfInterest::new("b", 40.0, -73.0);
        half.longitude = None;
        assert!(half.coordinates().is_none());
    }

    #[test]
    fn test_coordinates_out_of_range() {
        let loc = LocationOfInterest::new("a", 123.0, 0.0);
        assert!(loc.coordinates().is_none());
        assert!(loc.to_monitored_region(DEFAULT_RADIUS_METERS).is_none());
    }

    #[test]
    fn test_to_monitored_region_sanitizes_radius() {
        let loc = LocationOfInterest::new("a", 1.0, 2.0).with_radius(-5.0);
        let region = loc.to_monitored_region(150.0).unwrap();
        assert_eq!(region.radius_meters, 150.0);

        let loc = LocationOfInterest::new("b", 1.0, 2.0).with_radius(f64::NAN);
        assert_eq!(loc.to_monitored_region(100.0).unwrap().radius_meters, 100.0);

        let loc = LocationOfInterest::new("c", 1.0, 2.0).with_radius(250.0);
        assert_eq!(loc.to_monitored_region(100.0).unwrap().radius_meters, 250.0);
    }

    #[test]
    fn test_matches_any_tag() {
        let loc = LocationOfInterest::new("a", 1.0, 2.0)
            .with_tag("costco")
            .with_tag("shell");
        let owned = ["shell".to_string()];
        assert!(loc.matches_any_tag(owned.iter()));
        let other = ["target".to_string()];
        assert!(!loc.matches_any_tag(other.iter()));
    }

    #[test]
    fn test_same_geometry() {
        let a = MonitoredRegion::new("x", GeoPoint::new(1.0, 2.0), 100.0);
        let b = MonitoredRegion::new("x", GeoPoint::new(1.0, 2.0), 100.0);
        let c = MonitoredRegion::new("x", GeoPoint::new(1.0, 2.0), 120.0);
        assert!(a.same_geometry(&b));
        assert!(!a.same_geometry(&c));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"id": "store-1", "latitude": 47.6, "longitude": -122.3}"#;
        let loc: LocationOfInterest = serde_json::from_str(json).unwrap();
        assert_eq!(loc.radius_meters, DEFAULT_RADIUS_METERS);
        assert!(loc.owner_tags.is_empty());
        assert!(!loc.active);
        assert!(loc.coordinates().is_some());
    }

    #[test]
    fn test_deserialize_missing_coordinates() {
        let json = r#"{"id": "online-only", "owner_tags": ["rei"]}"#;
        let loc: LocationOfInterest = serde_json::from_str(json).unwrap();
        assert!(loc.coordinates().is_none());
        assert!(loc.owner_tags.contains("rei"));
    }

    #[test]
    fn test_monitoring_failed_event() {
        let event = RegionEvent::monitoring_failed("r1", "denied");
        assert_eq!(event.kind, RegionEventKind::MonitoringFailed);
        assert_eq!(event.error.as_deref(), Some("denied"));
        assert!(event.location.is_none());
    }
}
