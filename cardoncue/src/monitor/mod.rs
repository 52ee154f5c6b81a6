//! Capacity-limited region monitoring.
//!
//! Platforms cap the number of geofences an app may hold at once. This module
//! wraps the platform primitive ([`RegionMonitor`]) in a
//! [`CapacityLimitedMonitor`] that turns a desired region set into the minimal
//! sequence of deregister/register calls while never exceeding the cap.
//!
//! # Reconcile Ordering
//!
//! ```text
//! registered {A, B, C}   desired {B, C, D}   capacity 3
//!
//!   deregister A   ──►  {B, C}        (all removals first)
//!   register D     ──►  {B, C, D}     (then additions)
//! ```
//!
//! Removals always complete before additions start, so the primitive never
//! observes more than `capacity` regions at once.

mod capacity;
mod memory;

use std::fmt;

use thiserror::Error;

use crate::location::MonitoredRegion;
use crate::BoxFuture;

pub use capacity::{CapacityLimitedMonitor, ReconcileResult};
pub use memory::{InMemoryRegionMonitor, MonitorOp, DEFAULT_OP_LOG_CAPACITY};

/// Errors reported by the platform monitoring primitive.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    /// Region geometry was rejected (bad center or radius).
    #[error("Invalid region {region_id}: {reason}")]
    InvalidRegion { region_id: String, reason: String },

    /// The primitive is already holding its maximum number of regions.
    #[error("Monitoring capacity exceeded ({capacity} regions)")]
    CapacityExceeded { capacity: usize },

    /// The platform refused the request.
    #[error("Monitoring request rejected for {region_id}: {reason}")]
    Rejected { region_id: String, reason: String },
}

/// Platform region-monitoring primitive.
///
/// Registration is asynchronous and may fail per region. Implementations
/// enforce their own capacity; [`CapacityLimitedMonitor`] makes sure that
/// limit is never hit in normal operation.
///
/// # Dyn Compatibility
///
/// Uses [`BoxFuture`] so implementations can be held as
/// `Box<dyn RegionMonitor>`.
pub trait RegionMonitor: Send + Sync {
    /// Start monitoring `region`.
    fn register<'a>(&'a self, region: &'a MonitoredRegion) -> BoxFuture<'a, Result<(), MonitorError>>;

    /// Stop monitoring `region_id`.
    fn deregister<'a>(&'a self, region_id: &'a str) -> BoxFuture<'a, Result<(), MonitorError>>;

    /// Maximum number of regions the primitive accepts.
    fn capacity(&self) -> usize;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn RegionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionMonitor({}, capacity={})", self.name(), self.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MonitorError::CapacityExceeded { capacity: 20 };
        assert_eq!(err.to_string(), "Monitoring capacity exceeded (20 regions)");

        let err = MonitorError::Rejected {
            region_id: "r1".into(),
            reason: "denied".into(),
        };
        assert!(err.to_string().contains("r1"));
    }
}
