//! Reconcile a desired region set against the monitoring primitive.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::{MonitorError, RegionMonitor};
use crate::location::MonitoredRegion;

/// Outcome of one [`CapacityLimitedMonitor::reconcile`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileResult {
    /// Ids removed from monitoring (including re-registered geometry changes).
    pub deregistered: Vec<String>,
    /// Ids successfully registered.
    pub registered: Vec<String>,
    /// Ids whose registration failed, with the reason.
    pub failed: Vec<(String, MonitorError)>,
    /// Ids already registered with identical geometry.
    pub unchanged: Vec<String>,
}

impl ReconcileResult {
    /// Returns `true` if no deregister or register call was made.
    pub fn is_noop(&self) -> bool {
        self.deregistered.is_empty() && self.registered.is_empty() && self.failed.is_empty()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-{} +{} ={} failed {}",
            self.deregistered.len(),
            self.registered.len(),
            self.unchanged.len(),
            self.failed.len()
        )
    }
}

/// Keeps the platform's monitored set in sync with a desired set, never
/// exceeding `capacity`.
///
/// Bookkeeping tracks exactly the regions the primitive accepted. A region
/// whose registration failed is not recorded, so it is retried on the next
/// reconcile.
pub struct CapacityLimitedMonitor {
    inner: Arc<dyn RegionMonitor>,
    capacity: usize,
    registered: BTreeMap<String, MonitoredRegion>,
}

impl fmt::Debug for CapacityLimitedMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityLimitedMonitor")
            .field("inner", &self.inner.name())
            .field("capacity", &self.capacity)
            .field("registered", &self.registered.len())
            .finish()
    }
}

impl CapacityLimitedMonitor {
    /// Wrap `inner` with a budget of `capacity` regions.
    ///
    /// The effective capacity is the smaller of `capacity` and the primitive's
    /// own limit.
    pub fn new(inner: Arc<dyn RegionMonitor>, capacity: usize) -> Self {
        let effective = capacity.min(inner.capacity());
        if effective < capacity {
            tracing::warn!(
                requested = capacity,
                platform = inner.capacity(),
                monitor = inner.name(),
                "Monitoring budget clamped to platform capacity"
            );
        }
        Self {
            inner,
            capacity: effective,
            registered: BTreeMap::new(),
        }
    }

    /// Effective capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Regions currently registered, sorted by id.
    pub fn registered(&self) -> impl Iterator<Item = &MonitoredRegion> {
        self.registered.values()
    }

    /// Ids currently registered, sorted.
    pub fn registered_ids(&self) -> Vec<String> {
        self.registered.keys().cloned().collect()
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Bring the registered set to `desired`.
    ///
    /// Every deregistration completes before the first registration starts.
    /// Registration failures are collected in the result and never abort the
    /// batch. A desired set larger than the capacity is a caller bug: it
    /// trips a debug assertion and is truncated in release builds.
    pub async fn reconcile(&mut self, desired: &[MonitoredRegion]) -> ReconcileResult {
        debug_assert!(
            desired.len() <= self.capacity,
            "desired set of {} regions exceeds capacity {}",
            desired.len(),
            self.capacity
        );
        let desired = if desired.len() > self.capacity {
            tracing::error!(
                desired = desired.len(),
                capacity = self.capacity,
                "Desired region set exceeds capacity, truncating"
            );
            &desired[..self.capacity]
        } else {
            desired
        };

        // First occurrence of an id wins within the desired set
        let mut wanted: HashMap<&str, &MonitoredRegion> = HashMap::with_capacity(desired.len());
        let mut ordered: Vec<&MonitoredRegion> = Vec::with_capacity(desired.len());
        for region in desired {
            if let Entry::Vacant(slot) = wanted.entry(region.region_id.as_str()) {
                slot.insert(region);
                ordered.push(region);
            }
        }

        let mut result = ReconcileResult::default();

        let stale: Vec<String> = self
            .registered
            .iter()
            .filter(|(id, current)| match wanted.get(id.as_str()) {
                Some(next) => !current.same_geometry(next),
                None => true,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for region_id in stale {
            if let Err(e) = self.inner.deregister(&region_id).await {
                tracing::warn!(
                    region_id = %region_id,
                    error = %e,
                    "Deregister failed, dropping region from bookkeeping"
                );
            }
            self.registered.remove(&region_id);
            result.deregistered.push(region_id);
        }

        for region in ordered {
            let id = region.region_id.as_str();

            if self.registered.contains_key(id) {
                result.unchanged.push(id.to_string());
                continue;
            }

            match self.inner.register(region).await {
                Ok(()) => {
                    self.registered.insert(id.to_string(), region.clone());
                    result.registered.push(id.to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        region_id = %id,
                        error = %e,
                        "Region registration failed"
                    );
                    result.failed.push((id.to_string(), e));
                }
            }
        }

        tracing::debug!(
            deregistered = result.deregistered.len(),
            registered = result.registered.len(),
            unchanged = result.unchanged.len(),
            failed = result.failed.len(),
            monitored = self.registered.len(),
            "Reconciled monitored regions"
        );

        result
    }

    /// Deregister everything.
    pub async fn clear(&mut self) -> ReconcileResult {
        self.reconcile(&[]).await
    }
}
