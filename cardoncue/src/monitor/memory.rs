//! In-memory monitoring primitive.
//!
//! Behaves like a platform geofence service with a hard region cap. Supports
//! per-region failure injection and artificial latency, and records recent
//! operations so callers can assert on ordering.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use super::{MonitorError, RegionMonitor};
use crate::location::MonitoredRegion;
use crate::BoxFuture;

/// Operations kept in the log before the oldest are dropped.
pub const DEFAULT_OP_LOG_CAPACITY: usize = 1024;

/// One call observed by [`InMemoryRegionMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOp {
    /// `register(region_id)` was called.
    Register(String),
    /// `deregister(region_id)` was called.
    Deregister(String),
}

#[derive(Debug, Default)]
struct State {
    regions: BTreeMap<String, MonitoredRegion>,
    register_failures: HashMap<String, MonitorError>,
    deregister_failures: HashMap<String, MonitorError>,
    ops: VecDeque<MonitorOp>,
    peak: usize,
}

/// Simulated capacity-enforcing [`RegionMonitor`].
#[derive(Debug)]
pub struct InMemoryRegionMonitor {
    capacity: usize,
    latency: Duration,
    op_log_capacity: usize,
    state: Mutex<State>,
}

impl InMemoryRegionMonitor {
    /// Create a monitor that accepts at most `capacity` regions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            latency: Duration::ZERO,
            op_log_capacity: DEFAULT_OP_LOG_CAPACITY,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Keep at most `capacity` operations in the log. Zero disables it.
    pub fn with_op_log_capacity(mut self, capacity: usize) -> Self {
        self.op_log_capacity = capacity;
        self
    }

    /// Make every `register` of `region_id` fail with `error`.
    pub fn fail_register(&self, region_id: impl Into<String>, error: MonitorError) {
        self.state
            .lock()
            .register_failures
            .insert(region_id.into(), error);
    }

    /// Make every `deregister` of `region_id` fail with `error`.
    pub fn fail_deregister(&self, region_id: impl Into<String>, error: MonitorError) {
        self.state
            .lock()
            .deregister_failures
            .insert(region_id.into(), error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.register_failures.clear();
        state.deregister_failures.clear();
    }

    /// Ids currently monitored, sorted.
    pub fn region_ids(&self) -> Vec<String> {
        self.state.lock().regions.keys().cloned().collect()
    }

    /// Currently monitored region for `region_id`.
    pub fn region(&self, region_id: &str) -> Option<MonitoredRegion> {
        self.state.lock().regions.get(region_id).cloned()
    }

    /// Number of regions currently monitored.
    pub fn len(&self) -> usize {
        self.state.lock().regions.len()
    }

    /// Returns `true` if nothing is monitored.
    pub fn is_empty(&self) -> bool {
        self.state.lock().regions.is_empty()
    }

    /// Highest number of regions held at any point.
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    /// The most recent calls, oldest first.
    pub fn ops(&self) -> Vec<MonitorOp> {
        self.state.lock().ops.iter().cloned().collect()
    }

    /// Forget the operation log.
    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    fn record(&self, state: &mut State, op: MonitorOp) {
        if self.op_log_capacity == 0 {
            return;
        }
        if state.ops.len() >= self.op_log_capacity {
            state.ops.pop_front();
        }
        state.ops.push_back(op);
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn apply_register(&self, region: &MonitoredRegion) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        self.record(&mut state, MonitorOp::Register(region.region_id.clone()));

        if let Some(err) = state.register_failures.get(&region.region_id) {
            return Err(err.clone());
        }

        if !region.center.is_valid() {
            return Err(MonitorError::InvalidRegion {
                region_id: region.region_id.clone(),
                reason: format!("center out of range: {}", region.center),
            });
        }
        if !(region.radius_meters.is_finite() && region.radius_meters > 0.0) {
            return Err(MonitorError::InvalidRegion {
                region_id: region.region_id.clone(),
                reason: format!("radius must be positive, got {}", region.radius_meters),
            });
        }

        let replacing = state.regions.contains_key(&region.region_id);
        if !replacing && state.regions.len() >= self.capacity {
            return Err(MonitorError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        state
            .regions
            .insert(region.region_id.clone(), region.clone());
        let held = state.regions.len();
        state.peak = state.peak.max(held);
        Ok(())
    }

    fn apply_deregister(&self, region_id: &str) -> Result<(), MonitorError> {
        let mut state = self.state.lock();
        self.record(&mut state, MonitorOp::Deregister(region_id.to_string()));

        // Platforms release the region even when they report an error
        state.regions.remove(region_id);

        match state.deregister_failures.get(region_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl RegionMonitor for InMemoryRegionMonitor {
    fn register<'a>(
        &'a self,
        region: &'a MonitoredRegion,
    ) -> BoxFuture<'a, Result<(), MonitorError>> {
        Box::pin(async move {
            self.delay().await;
            self.apply_register(region)
        })
    }

    fn deregister<'a>(&'a self, region_id: &'a str) -> BoxFuture<'a, Result<(), MonitorError>> {
        Box::pin(async move {
            self.delay().await;
            self.apply_deregister(region_id)
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn region(id: &str) -> MonitoredRegion {
        MonitoredRegion::new(id, GeoPoint::new(10.0, 20.0), 100.0)
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let monitor = InMemoryRegionMonitor::new(2);
        monitor.register(&region("a")).await.unwrap();
        monitor.register(&region("b")).await.unwrap();
        assert_eq!(monitor.region_ids(), vec!["a", "b"]);

        monitor.deregister("a").await.unwrap();
        assert_eq!(monitor.region_ids(), vec!["b"]);
        assert_eq!(
            monitor.ops(),
            vec![
                MonitorOp::Register("a".into()),
                MonitorOp::Register("b".into()),
                MonitorOp::Deregister("a".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let monitor = InMemoryRegionMonitor::new(1);
        monitor.register(&region("a")).await.unwrap();
        let err = monitor.register(&region("b")).await.unwrap_err();
        assert_eq!(err, MonitorError::CapacityExceeded { capacity: 1 });

        // Re-registering an existing id does not need a free slot
        monitor.register(&region("a")).await.unwrap();
        assert_eq!(monitor.peak(), 1);
    }

    #[tokio::test]
    async fn test_invalid_geometry_rejected() {
        let monitor = InMemoryRegionMonitor::new(5);
        let bad_center = MonitoredRegion::new("x", GeoPoint::new(120.0, 0.0), 100.0);
        let bad_radius = MonitoredRegion::new("y", GeoPoint::new(1.0, 0.0), 0.0);

        assert!(matches!(
            monitor.register(&bad_center).await,
            Err(MonitorError::InvalidRegion { .. })
        ));
        assert!(matches!(
            monitor.register(&bad_radius).await,
            Err(MonitorError::InvalidRegion { .. })
        ));
        assert!(monitor.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let monitor = InMemoryRegionMonitor::new(5);
        monitor.fail_register(
            "a",
            MonitorError::Rejected {
                region_id: "a".into(),
                reason: "denied".into(),
            },
        );
        assert!(monitor.register(&region("a")).await.is_err());
        assert!(monitor.register(&region("b")).await.is_ok());

        monitor.fail_deregister(
            "b",
            MonitorError::Rejected {
                region_id: "b".into(),
                reason: "busy".into(),
            },
        );
        assert!(monitor.deregister("b").await.is_err());
        assert!(monitor.is_empty(), "failed deregister still releases the slot");

        monitor.clear_failures();
        assert!(monitor.register(&region("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_op_log_keeps_newest_entries() {
        let monitor = InMemoryRegionMonitor::new(1).with_op_log_capacity(3);
        for _ in 0..10 {
            monitor.register(&region("a")).await.unwrap();
            monitor.deregister("a").await.unwrap();
        }
        monitor.register(&region("b")).await.unwrap();

        assert_eq!(
            monitor.ops(),
            vec![
                MonitorOp::Register("a".into()),
                MonitorOp::Deregister("a".into()),
                MonitorOp::Register("b".into()),
            ]
        );
        assert_eq!(monitor.region_ids(), vec!["b"]);

        let silent = InMemoryRegionMonitor::new(1).with_op_log_capacity(0);
        silent.register(&region("a")).await.unwrap();
        assert!(silent.ops().is_empty());
        assert_eq!(silent.len(), 1);
    }

    #[tokio::test]
    async fn test_op_log_default_is_bounded() {
        let monitor = InMemoryRegionMonitor::new(1);
        for _ in 0..DEFAULT_OP_LOG_CAPACITY {
            monitor.register(&region("a")).await.unwrap();
        }
        monitor.deregister("a").await.unwrap();

        let ops = monitor.ops();
        assert_eq!(ops.len(), DEFAULT_OP_LOG_CAPACITY);
        assert_eq!(ops.last(), Some(&MonitorOp::Deregister("a".into())));
    }
}
