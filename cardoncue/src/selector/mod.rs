//! Region selection under a fixed monitoring budget.
//!
//! Picks which saved locations should be watched next, given the current
//! position and a hard cap on concurrently monitored regions.
//!
//! # Algorithm
//!
//! 1. Skip candidates without valid coordinates (counted, never selected).
//! 2. Compute the haversine distance from the current position.
//! 3. Split into a priority tier (owner tags intersect the user's tags) and
//!    a standard tier.
//! 4. Sort each tier by distance, then by id.
//! 5. Priority tier first, then standard; keep the first `max_regions`.
//!    A repeated id keeps its best-ranked copy.
//! 6. Flip `active` on the snapshot to match the result.
//!
//! The ordering is a total order (`f64::total_cmp` then id), so identical
//! inputs always produce the identical selection. Flapping selections would
//! cost a deregister/register pair per flap against the platform.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::geo::GeoPoint;
use crate::location::{sanitize_radius, LocationOfInterest, MonitoredRegion, DEFAULT_RADIUS_METERS};
use crate::ranking::RankedRegion;

/// Default monitoring budget (platform limit on concurrent geofences).
pub const DEFAULT_MAX_CONCURRENT_REGIONS: usize = 20;

/// One entry of a selection, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRegion {
    /// Region to register.
    pub region: MonitoredRegion,
    /// Distance from the position the selection was computed for.
    pub distance_m: Option<f64>,
    /// Whether the entry came from the priority tier.
    pub priority: bool,
    /// Score assigned by the ranking service, for remote selections.
    pub rank_score: Option<f64>,
}

/// Result of a selection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Selected regions, best first.
    pub regions: Vec<SelectedRegion>,
    /// Candidates skipped for missing or invalid coordinates.
    pub skipped_invalid: usize,
    /// Candidates with valid coordinates that were considered.
    pub considered: usize,
}

impl Selection {
    /// Number of selected regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Selected ids in selection order.
    pub fn ids(&self) -> Vec<&str> {
        self.regions
            .iter()
            .map(|s| s.region.region_id.as_str())
            .collect()
    }

    /// Number of selected entries from the priority tier.
    pub fn priority_count(&self) -> usize {
        self.regions.iter().filter(|s| s.priority).count()
    }

    /// The desired monitored set, in selection order.
    pub fn desired_regions(&self) -> Vec<MonitoredRegion> {
        self.regions.iter().map(|s| s.region.clone()).collect()
    }
}

/// Internal sort key for one candidate.
struct Ranked {
    index: usize,
    region: MonitoredRegion,
    distance_m: f64,
    priority: bool,
}

/// Nearest-K selector with priority tiering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSelector {
    max_regions: usize,
    default_radius_meters: f64,
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_REGIONS)
    }
}

impl RegionSelector {
    /// Create a selector with the given budget.
    pub fn new(max_regions: usize) -> Self {
        Self {
            max_regions,
            default_radius_meters: DEFAULT_RADIUS_METERS,
        }
    }

    /// Radius used for candidates whose own radius is unusable.
    pub fn with_default_radius(mut self, radius_meters: f64) -> Self {
        self.default_radius_meters = sanitize_radius(radius_meters, DEFAULT_RADIUS_METERS);
        self
    }

    /// The monitoring budget.
    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    /// Select up to `max_regions` candidates to monitor from `position`.
    ///
    /// Sets `active` on every element of `candidates`: `true` for selected
    /// entries, `false` for everything else.
    ///
    /// # Arguments
    ///
    /// * `candidates` - Snapshot of the location store (archived items already removed)
    /// * `position` - Current position
    /// * `owned_tags` - Tags the user holds; matching candidates form the priority tier
    pub fn select(
        &self,
        candidates: &mut [LocationOfInterest],
        position: GeoPoint,
        owned_tags: &HashSet<String>,
    ) -> Selection {
        let mut skipped_invalid = 0;
        let mut ranked: Vec<Ranked> = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            let Some(region) = candidate.to_monitored_region(self.default_radius_meters) else {
                skipped_invalid += 1;
                continue;
            };
            ranked.push(Ranked {
                index,
                distance_m: position.distance_to(&region.center),
                region,
                priority: candidate.matches_any_tag(owned_tags.iter()),
            });
        }

        if skipped_invalid > 0 {
            tracing::debug!(
                skipped = skipped_invalid,
                "Skipped candidates without valid coordinates"
            );
        }

        let considered = ranked.len();

        ranked.sort_by(|a, b| {
            // Priority tier first
            b.priority.cmp(&a.priority).then_with(|| {
                distance_then_id(
                    (a.distance_m, &a.region.region_id),
                    (b.distance_m, &b.region.region_id),
                )
            })
        });

        // Dedupe after sorting: a repeated id keeps its best-ranked copy

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.max_regions);
        let mut chosen: Vec<&Ranked> = Vec::with_capacity(self.max_regions.min(ranked.len()));
        for entry in &ranked {
            if chosen.len() >= self.max_regions {
                break;
            }
            if seen.insert(entry.region.region_id.as_str()) {
                chosen.push(entry);
            }
        }

        let regions: Vec<SelectedRegion> = chosen
            .iter()
            .map(|entry| SelectedRegion {
                region: entry.region.clone(),
                distance_m: Some(entry.distance_m),
                priority: entry.priority,
                rank_score: None,
            })
            .collect();

        let selected_indices: HashSet<usize> = chosen.iter().map(|entry| entry.index).collect();
        for (index, candidate) in candidates.iter_mut().enumerate() {
            candidate.active = selected_indices.contains(&index);
        }

        Selection {
            regions,
            skipped_invalid,
            considered,
        }
    }

    /// Build a selection from a ranking-service response.
    ///
    /// Entries with invalid coordinates are dropped and counted, duplicate ids
    /// keep their first occurrence, and the result is ordered by descending
    /// score then id and truncated to the budget. `active` flags are applied
    /// to `candidates` by id; ranked ids unknown to the store are still
    /// selected.
    pub fn select_ranked(
        &self,
        ranked: &[RankedRegion],
        position: GeoPoint,
        candidates: &mut [LocationOfInterest],
        owned_tags: &HashSet<String>,
    ) -> Selection {
        let mut skipped_invalid = 0;
        let mut seen: HashSet<&str> = HashSet::with_capacity(ranked.len());
        let mut valid: Vec<(&RankedRegion, GeoPoint, f64)> = Vec::with_capacity(ranked.len());

        for entry in ranked {
            let Some(center) = entry.center() else {
                skipped_invalid += 1;
                continue;
            };
            if !seen.insert(entry.id.as_str()) {
                continue;
            }
            let score = if entry.priority.is_finite() {
                entry.priority
            } else {
                0.0
            };
            valid.push((entry, center, score));
        }

        if skipped_invalid > 0 {
            tracing::debug!(
                skipped = skipped_invalid,
                "Ranking service returned regions without valid coordinates"
            );
        }

        let considered = valid.len();

        valid.sort_by(|(a, _, score_a), (b, _, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| a.id.cmp(&b.id))
        });
        valid.truncate(self.max_regions);

        let regions: Vec<SelectedRegion> = valid
            .iter()
            .map(|(entry, center, score)| {
                let local = candidates.iter().find(|c| c.id == entry.id);
                let radius = entry
                    .radius_meters
                    .or_else(|| local.map(|c| c.radius_meters))
                    .unwrap_or(self.default_radius_meters);
                SelectedRegion {
                    region: MonitoredRegion::new(
                        entry.id.clone(),
                        *center,
                        sanitize_radius(radius, self.default_radius_meters),
                    ),
                    distance_m: Some(position.distance_to(center)),
                    priority: local
                        .map(|c| c.matches_any_tag(owned_tags.iter()))
                        .unwrap_or(false),
                    rank_score: Some(*score),
                }
            })
            .collect();

        let selected_ids: HashSet<&str> = regions
            .iter()
            .map(|s| s.region.region_id.as_str())
            .collect();
        for candidate in candidates.iter_mut() {
            candidate.active = selected_ids.contains(candidate.id.as_str());
        }

        Selection {
            regions,
            skipped_invalid,
            considered,
        }
    }
}

/// Nearest first; equal distances fall back to id order.
fn distance_then_id(a: (f64, &str), b: (f64, &str)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1))
}
