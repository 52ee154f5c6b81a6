//! Location store abstraction.
//!
//! The geofence core never owns saved locations. It reads a snapshot at the
//! start of every refresh cycle and writes back only two things: the `active`
//! flag and the last-entry timestamp.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::model::LocationOfInterest;

/// Read/write view of the external location store.
///
/// All methods are synchronous; implementations are expected to be cheap
/// in-memory reads. Snapshots returned by [`all_candidates`](Self::all_candidates)
/// are owned copies, so no lock is held across an `.await`.
pub trait LocationStore: Send + Sync {
    /// Snapshot of every candidate location (archived items already excluded).
    fn all_candidates(&self) -> Vec<LocationOfInterest>;

    /// Tags the user currently holds (e.g. card networks), used for the priority tier.
    fn owned_tags(&self) -> HashSet<String>;

    /// Look up a single location by id.
    fn get(&self, id: &str) -> Option<LocationOfInterest>;

    /// Set `active = true` for every id in `active_ids` and `false` for the rest.
    fn apply_active(&self, active_ids: &HashSet<String>);

    /// Stamp the last entry time for `id`. Returns `false` if the id is unknown.
    fn record_entry(&self, id: &str, at: DateTime<Utc>) -> bool;
}

/// Thread-safe in-memory [`LocationStore`].
///
/// Used by the CLI and tests, and as a reference for platform stores.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    locations: RwLock<BTreeMap<String, LocationOfInterest>>,
    owned_tags: RwLock<HashSet<String>>,
}

impl InMemoryLocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `locations`.
    ///
    /// Later entries replace earlier ones with the same id.
    pub fn with_locations(locations: impl IntoIterator<Item = LocationOfInterest>) -> Self {
        let store = Self::new();
        for location in locations {
            store.upsert(location);
        }
        store
    }

    /// Set the tags the user holds.
    pub fn with_owned_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_owned_tags(tags);
        self
    }

    /// Parse a JSON array of locations.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        let locations: Vec<LocationOfInterest> = serde_json::from_reader(reader)?;
        Ok(Self::with_locations(locations))
    }

    /// Insert or replace a location.
    pub fn upsert(&self, location: LocationOfInterest) {
        self.locations.write().insert(location.id.clone(), location);
    }

    /// Remove a location. Returns the removed record.
    pub fn remove(&self, id: &str) -> Option<LocationOfInterest> {
        self.locations.write().remove(id)
    }

    /// Replace the owned tag set.
    pub fn set_owned_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.owned_tags.write() = tags.into_iter().map(Into::into).collect();
    }

    /// Number of stored locations.
    pub fn len(&self) -> usize {
        self.locations.read().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.locations.read().is_empty()
    }

    /// Ids of all locations currently flagged active, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        self.locations
            .read()
            .values()
            .filter(|l| l.active)
            .map(|l| l.id.clone())
            .collect()
    }
}

impl LocationStore for InMemoryLocationStore {
    fn all_candidates(&self) -> Vec<LocationOfInterest> {
        self.locations.read().values().cloned().collect()
    }

    fn owned_tags(&self) -> HashSet<String> {
        self.owned_tags.read().clone()
    }

    fn get(&self, id: &str) -> Option<LocationOfInterest> {
        self.locations.read().get(id).cloned()
    }

    fn apply_active(&self, active_ids: &HashSet<String>) {
        let mut locations = self.locations.write();
        for location in locations.values_mut() {
            location.active = active_ids.contains(&location.id);
        }
    }

    fn record_entry(&self, id: &str, at: DateTime<Utc>) -> bool {
        match self.locations.write().get_mut(id) {
            Some(location) => {
                location.last_entry_at = Some(at);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> InMemoryLocationStore {
        InMemoryLocationStore::with_locations(vec![
            LocationOfInterest::new("b", 1.0, 1.0),
            LocationOfInterest::new("a", 2.0, 2.0),
            LocationOfInterest::without_coordinates("c"),
        ])
    }

    #[test]
    fn test_snapshot_is_sorted_by_id() {
        let store = sample_store();
        let ids: Vec<_> = store.all_candidates().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_snapshot_is_detached_from_store() {
        let store = sample_store();
        let mut snapshot = store.all_candidates();
        snapshot[0].active = true;
        assert!(!store.get("a").unwrap().active);
    }

    #[test]
    fn test_apply_active_sets_and_clears() {
        let store = sample_store();
        store.apply_active(&HashSet::from(["a".to_string(), "c".to_string()]));
        assert_eq!(store.active_ids(), vec!["a", "c"]);

        store.apply_active(&HashSet::from(["b".to_string()]));
        assert_eq!(store.active_ids(), vec!["b"]);
    }

    #[test]
    fn test_record_entry() {
        let store = sample_store();
        let now = Utc::now();
        assert!(store.record_entry("a", now));
        assert_eq!(store.get("a").unwrap().last_entry_at, Some(now));
        assert!(!store.record_entry("missing", now));
    }

    #[test]
    fn test_owned_tags() {
        let store = sample_store().with_owned_tags(["costco", "rei"]);
        let tags = store.owned_tags();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("rei"));
    }

    #[test]
    fn test_upsert_and_remove() {
        let store = InMemoryLocationStore::new();
        assert!(store.is_empty());
        store.upsert(LocationOfInterest::new("x", 0.0, 0.0));
        store.upsert(LocationOfInterest::new("x", 1.0, 0.0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("x").unwrap().latitude, Some(1.0));
        assert!(store.remove("x").is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_json_reader() {
        let json = r#"[
            {"id": "one", "latitude": 10.0, "longitude": 20.0, "owner_tags": ["shell"]},
            {"id": "two"}
        ]"#;
        let store = InMemoryLocationStore::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("two").unwrap().coordinates().is_none());
    }

    #[test]
    fn test_from_json_reader_rejects_garbage() {
        assert!(InMemoryLocationStore::from_json_reader("{not json".as_bytes()).is_err());
    }
}
