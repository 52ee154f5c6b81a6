//! Geofence rotation coordinator.
//!
//! Ties the pieces together: listens to the location source, asks the
//! [`RefreshPolicy`](crate::refresh::RefreshPolicy) whether the monitored set
//! is stale, recomputes it with the [`RegionSelector`] or the ranking
//! service, and reconciles the result against the capacity-limited monitor.
//!
//! # Architecture
//!
//! ```text
//!  GeofenceCoordinator (cloneable handle)
//!        │ Command + oneshot reply
//!        ▼
//!  ┌───────────────────────┐   LocationEvent   ┌────────────────┐
//!  │   coordinator task    │◄──────────────────│ LocationSource │
//!  │ phase, RefreshState,  │                   └────────────────┘
//!  │ counters              │── spawn ──► RefreshCycle ──► CapacityLimitedMonitor
//!  └──────────┬────────────┘                (one at a time)       (async mutex)
//!             │ RegionEvent (broadcast)
//!             ▼
//!       notification layer
//! ```
//!
//! A single task owns all mutable coordinator state, so position updates,
//! visits, region events and commands are handled strictly one at a time.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = GeofenceCoordinator::builder(config, store, monitor, source)
//!     .with_ranking_client(client)
//!     .spawn();
//!
//! let mut events = coordinator.subscribe();
//! coordinator.start().await?;
//! while let Ok(event) = events.recv().await {
//!     notify(event);
//! }
//! ```

mod actor;
mod config;
mod cycle;
mod error;
mod status;

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::location::{LocationSource, LocationStore, RegionEvent};
use crate::monitor::{CapacityLimitedMonitor, RegionMonitor};
use crate::ranking::RegionRankingClient;
use actor::{Command, CoordinatorActor};

pub use config::{
    GeofenceConfig, DEFAULT_COMMAND_CHANNEL_CAPACITY, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
pub use error::{CoordinatorError, RefreshError};
pub use status::{CoordinatorPhase, CoordinatorStatus, RefreshOutcome, RefreshReport};

/// Assembles a coordinator from its collaborators.
pub struct CoordinatorBuilder {
    config: GeofenceConfig,
    store: Arc<dyn LocationStore>,
    monitor: Arc<dyn RegionMonitor>,
    source: Arc<dyn LocationSource>,
    ranking: Option<Arc<dyn RegionRankingClient>>,
}

impl fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("config", &self.config)
            .field("monitor", &self.monitor.name())
            .field("ranking", &self.ranking.as_ref().map(|c| c.name()))
            .finish_non_exhaustive()
    }
}

impl CoordinatorBuilder {
    /// Use a remote ranking service instead of local nearest-first selection.
    pub fn with_ranking_client(mut self, client: Arc<dyn RegionRankingClient>) -> Self {
        self.ranking = Some(client);
        self
    }

    /// Spawn the coordinator task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime. The coordinator starts
    /// idle; call [`GeofenceCoordinator::start`] to begin monitoring.
    pub fn spawn(mut self) -> GeofenceCoordinator {
        let monitor = CapacityLimitedMonitor::new(self.monitor, self.config.max_concurrent_regions);
        // Never select more than the platform can hold
        self.config.max_concurrent_regions = monitor.capacity();
        let selector = self.config.selector();

        let (command_tx, command_rx) = mpsc::channel(self.config.command_channel_capacity.max(1));
        let (events_tx, _) = broadcast::channel(self.config.event_channel_capacity.max(1));

        let actor = CoordinatorActor::new(
            self.config,
            selector,
            self.store,
            self.source,
            self.ranking,
            monitor,
            events_tx.clone(),
            command_rx,
        );
        tokio::spawn(actor.run());

        GeofenceCoordinator {
            commands: command_tx,
            events: events_tx,
        }
    }
}

/// Handle to a running coordinator task.
///
/// Cheap to clone. The task exits after [`shutdown`](Self::shutdown) or once
/// every handle has been dropped; in both cases it deregisters all regions
/// first.
#[derive(Clone)]
pub struct GeofenceCoordinator {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<RegionEvent>,
}

impl fmt::Debug for GeofenceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeofenceCoordinator")
            .field("closed", &self.commands.is_closed())
            .finish_non_exhaustive()
    }
}

impl GeofenceCoordinator {
    /// Begin assembling a coordinator.
    ///
    /// # Arguments
    ///
    /// * `config` - Thresholds, budget and channel sizes
    /// * `store` - Saved locations; read on every refresh, written for active flags and entries
    /// * `monitor` - Platform monitoring primitive
    /// * `source` - Platform location service
    pub fn builder(
        config: GeofenceConfig,
        store: Arc<dyn LocationStore>,
        monitor: Arc<dyn RegionMonitor>,
        source: Arc<dyn LocationSource>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            store,
            monitor,
            source,
            ranking: None,
        }
    }

    /// Subscribe to the source and run the first refresh.
    ///
    /// Resolves once that refresh finished. If no position is known yet the
    /// outcome is [`RefreshOutcome::Deferred`] and the first position update
    /// performs it.
    pub async fn start(&self) -> Result<RefreshOutcome, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)?
    }

    /// Cancel any in-flight refresh, unsubscribe and deregister every region.
    ///
    /// Stopping an idle coordinator is a no-op.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)
    }

    /// Refresh now, regardless of distance and time thresholds.
    ///
    /// If a refresh is already running, the request is served by the cycle
    /// that follows it.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ForceRefresh { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)?
    }

    /// Snapshot of the coordinator state.
    pub async fn status(&self) -> Result<CoordinatorStatus, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)
    }

    /// Stop monitoring and end the coordinator task.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)
    }

    /// Receive region events (enter, exit, monitoring failures).
    ///
    /// Slow receivers lag and skip events rather than blocking the coordinator.
    pub fn subscribe(&self) -> broadcast::Receiver<RegionEvent> {
        self.events.subscribe()
    }

    /// Returns `true` once the coordinator task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::geo::{offset_m, GeoPoint};
    use crate::location::{
        ChannelLocationSource, InMemoryLocationStore, LocationOfInterest, RegionEventKind,
    };
    use crate::monitor::InMemoryRegionMonitor;
    use crate::refresh::RefreshTrigger;

    const ORIGIN: GeoPoint = GeoPoint {
        latitude: 51.5074,
        longitude: -0.1278,
    };

    struct Harness {
        coordinator: GeofenceCoordinator,
        store: Arc<InMemoryLocationStore>,
        platform: Arc<InMemoryRegionMonitor>,
        source: Arc<ChannelLocationSource>,
    }

    fn harness(count: usize, capacity: usize) -> Harness {
        harness_with(
            GeofenceConfig::default().with_max_concurrent_regions(capacity),
            count,
        )
    }

    fn harness_with(config: GeofenceConfig, count: usize) -> Harness {
        let store = Arc::new(InMemoryLocationStore::with_locations((0..count).map(|i| {
            let p = offset_m(ORIGIN, 100.0 * (i + 1) as f64, 0.0);
            LocationOfInterest::new(format!("loc-{:02}", i), p.latitude, p.longitude)
        })));
        let platform = Arc::new(InMemoryRegionMonitor::new(config.max_concurrent_regions));
        let source = Arc::new(ChannelLocationSource::new());

        let coordinator =
            GeofenceCoordinator::builder(config, store.clone(), platform.clone(), source.clone())
                .spawn();

        Harness {
            coordinator,
            store,
            platform,
            source,
        }
    }

    /// Let the coordinator task drain its queues.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_start_without_position_defers() {
        let h = harness(3, 2);

        let outcome = h.coordinator.start().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Deferred);

        let status = h.coordinator.status().await.unwrap();
        assert_eq!(status.phase, CoordinatorPhase::Monitoring);
        assert!(h.source.is_subscribed());
        assert!(h.platform.is_empty());
    }

    #[tokio::test]
    async fn test_first_position_runs_deferred_refresh() {
        let h = harness(5, 3);
        h.coordinator.start().await.unwrap();

        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 20.0);
        settle().await;

        assert_eq!(h.platform.region_ids(), vec!["loc-00", "loc-01", "loc-02"]);
        assert_eq!(h.store.active_ids(), vec!["loc-00", "loc-01", "loc-02"]);

        let status = h.coordinator.status().await.unwrap();
        assert_eq!(status.refresh_cycles, 1);
        assert_eq!(status.refresh_state.last_refresh_location, Some(ORIGIN));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let h = harness(1, 1);
        h.coordinator.start().await.unwrap();
        assert_eq!(
            h.coordinator.start().await,
            Err(CoordinatorError::AlreadyStarted)
        );
    }

    #[tokio::test]
    async fn test_force_refresh_requires_running() {
        let h = harness(1, 1);
        assert_eq!(
            h.coordinator.force_refresh().await,
            Err(CoordinatorError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_force_refresh_completes_with_report() {
        let h = harness(4, 2);
        h.coordinator.start().await.unwrap();
        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 10.0);
        settle().await;

        let outcome = h.coordinator.force_refresh().await.unwrap();
        let report = outcome.report().expect("completed");
        assert_eq!(report.trigger, RefreshTrigger::Manual);
        assert_eq!(report.source, "local");
        assert!(report.reconcile.is_noop());
        assert_eq!(report.monitored, vec!["loc-00", "loc-01"]);
    }

    #[tokio::test]
    async fn test_selection_follows_platform_capacity() {
        let store = Arc::new(InMemoryLocationStore::with_locations((0..5).map(|i| {
            let p = offset_m(ORIGIN, 100.0 * (i + 1) as f64, 0.0);
            LocationOfInterest::new(format!("loc-{:02}", i), p.latitude, p.longitude)
        })));
        let platform = Arc::new(InMemoryRegionMonitor::new(2));
        let source = Arc::new(ChannelLocationSource::new());
        let coordinator = GeofenceCoordinator::builder(
            GeofenceConfig::default().with_max_concurrent_regions(4),
            store,
            platform.clone(),
            source.clone(),
        )
        .spawn();

        coordinator.start().await.unwrap();
        source.publish_position(ORIGIN.latitude, ORIGIN.longitude, 10.0);
        settle().await;

        let outcome = coordinator.force_refresh().await.unwrap();
        let report = outcome.report().expect("completed");
        assert_eq!(report.selected, vec!["loc-00", "loc-01"]);
        assert!(report.reconcile.failed.is_empty());
        assert_eq!(platform.region_ids(), vec!["loc-00", "loc-01"]);
    }

    #[tokio::test]
    async fn test_invalid_fix_is_ignored() {
        let h = harness(2, 2);
        h.coordinator.start().await.unwrap();

        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, -1.0);
        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, f64::NAN);
        h.source.publish_position(f64::NAN, ORIGIN.longitude, 10.0);
        settle().await;

        let status = h.coordinator.status().await.unwrap();
        assert!(status.refresh_state.current_position.is_none());
        assert!(h.platform.is_empty());
    }

    #[tokio::test]
    async fn test_coarse_fix_drives_first_refresh() {
        let h = harness(3, 2);
        h.coordinator.start().await.unwrap();

        // Cell-tower fix
        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 2_500.0);
        settle().await;

        let status = h.coordinator.status().await.unwrap();
        assert_eq!(status.refresh_cycles, 1);
        assert_eq!(h.platform.region_ids(), vec!["loc-00", "loc-01"]);
    }

    #[tokio::test]
    async fn test_accuracy_limit_is_opt_in() {
        let config = GeofenceConfig::default()
            .with_max_concurrent_regions(2)
            .with_max_position_accuracy(Some(1_000.0));
        let h = harness_with(config, 3);
        h.coordinator.start().await.unwrap();

        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 1_500.0);
        settle().await;

        let status = h.coordinator.status().await.unwrap();
        assert!(status.refresh_state.current_position.is_none());
        assert!(h.platform.is_empty());
    }

    #[tokio::test]
    async fn test_stop_deregisters_and_keeps_state() {
        let h = harness(3, 3);
        h.coordinator.start().await.unwrap();
        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 10.0);
        settle().await;
        assert_eq!(h.platform.len(), 3);

        h.coordinator.stop().await.unwrap();

        assert!(h.platform.is_empty());
        assert!(h.store.active_ids().is_empty());
        assert!(!h.source.is_subscribed());
        let status = h.coordinator.status().await.unwrap();
        assert_eq!(status.phase, CoordinatorPhase::Idle);
        assert!(status.monitored_ids.is_empty());
        assert_eq!(status.refresh_state.last_refresh_location, Some(ORIGIN));
    }

    #[tokio::test]
    async fn test_restart_refreshes_immediately_with_known_position() {
        let h = harness(3, 3);
        h.coordinator.start().await.unwrap();
        h.source
            .publish_position(ORIGIN.latitude, ORIGIN.longitude, 10.0);
        settle().await;
        h.coordinator.stop().await.unwrap();

        let outcome = h.coordinator.start().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(h.platform.len(), 3);
    }

    #[tokio::test]
    async fn test_enter_event_stamps_and_broadcasts() {
        let h = harness(2, 2);
        let mut events = h.coordinator.subscribe();
        h.coordinator.start().await.unwrap();

        h.source.publish(crate::location::LocationEvent::RegionEntered {
            region_id: "loc-01".into(),
        });

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, RegionEventKind::Enter);
        assert_eq!(event.region_id, "loc-01");
        let location = event.location.expect("resolved");
        assert!(location.last_entry_at.is_some());
        assert!(h.store.get("loc-01").unwrap().last_entry_at.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let h = harness(1, 1);
        h.coordinator.start().await.unwrap();
        h.coordinator.shutdown().await.unwrap();
        settle().await;

        assert!(h.coordinator.is_closed());
        assert_eq!(
            h.coordinator.status().await,
            Err(CoordinatorError::ShutDown)
        );
    }
}
