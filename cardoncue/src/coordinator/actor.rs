//! The coordinator task.
//!
//! One task owns the phase, the refresh state and the counters. Handles talk
//! to it through a command channel; the location source talks to it through
//! an unbounded event channel created on each `start`. Refresh cycles run in
//! a spawned task and report back through their `JoinHandle`.
//!
//! # Coalescing
//!
//! Only one cycle is in flight. While it runs:
//!
//! - position updates set `pending_position` (the latest position is already
//!   in `RefreshState`); the policy is evaluated again when the cycle ends
//! - visits and manual requests set `pending_forced` and run unconditionally
//!   once the cycle ends; manual callers wait for that next cycle

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::cycle::{CycleResult, RefreshCycle};
use super::{
    CoordinatorError, CoordinatorPhase, CoordinatorStatus, GeofenceConfig, RefreshError,
    RefreshOutcome,
};
use crate::geo::GeoPoint;
use crate::location::{
    LocationEvent, LocationSource, LocationStore, RegionEvent, RegionEventKind,
};
use crate::monitor::CapacityLimitedMonitor;
use crate::ranking::RegionRankingClient;
use crate::refresh::{RefreshPolicy, RefreshState, RefreshTrigger};
use crate::selector::RegionSelector;

pub(super) type OutcomeReply = oneshot::Sender<Result<RefreshOutcome, CoordinatorError>>;

/// Requests sent from [`GeofenceCoordinator`](super::GeofenceCoordinator) handles.
pub(super) enum Command {
    Start { reply: OutcomeReply },
    Stop { reply: oneshot::Sender<()> },
    ForceRefresh { reply: OutcomeReply },
    Status { reply: oneshot::Sender<CoordinatorStatus> },
    Shutdown { reply: oneshot::Sender<()> },
}

struct InFlight {
    trigger: RefreshTrigger,
    cancel: CancellationToken,
    handle: JoinHandle<CycleResult>,
    waiters: Vec<OutcomeReply>,
}

pub(super) struct CoordinatorActor {
    config: GeofenceConfig,
    policy: RefreshPolicy,
    selector: RegionSelector,
    store: Arc<dyn LocationStore>,
    source: Arc<dyn LocationSource>,
    ranking: Option<Arc<dyn RegionRankingClient>>,
    monitor: Arc<Mutex<CapacityLimitedMonitor>>,
    events: broadcast::Sender<RegionEvent>,
    commands: mpsc::Receiver<Command>,
    location_rx: Option<mpsc::UnboundedReceiver<LocationEvent>>,

    phase: CoordinatorPhase,
    state: RefreshState,
    /// Set on start; the monitored set is empty until a cycle completes.
    needs_initial_refresh: bool,
    in_flight: Option<InFlight>,
    pending_position: bool,
    pending_forced: Option<RefreshTrigger>,
    next_waiters: Vec<OutcomeReply>,

    monitored_ids: Vec<String>,
    refresh_cycles: u64,
    failed_cycles: u64,
    consecutive_failures: u32,
}

impl CoordinatorActor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: GeofenceConfig,
        selector: RegionSelector,
        store: Arc<dyn LocationStore>,
        source: Arc<dyn LocationSource>,
        ranking: Option<Arc<dyn RegionRankingClient>>,
        monitor: CapacityLimitedMonitor,
        events: broadcast::Sender<RegionEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            policy: config.refresh_policy(),
            config,
            selector,
            store,
            source,
            ranking,
            monitor: Arc::new(Mutex::new(monitor)),
            events,
            commands,
            location_rx: None,
            phase: CoordinatorPhase::Idle,
            state: RefreshState::new(),
            needs_initial_refresh: false,
            in_flight: None,
            pending_position: false,
            pending_forced: None,
            next_waiters: Vec::new(),
            monitored_ids: Vec::new(),
            refresh_cycles: 0,
            failed_cycles: 0,
            consecutive_failures: 0,
        }
    }

    /// Run until shutdown or until every handle is dropped.
    pub(super) async fn run(mut self) {
        tracing::debug!(
            capacity = self.selector.max_regions(),
            ranking = self.ranking.as_ref().map(|c| c.name()).unwrap_or("local"),
            "Geofence coordinator task started"
        );

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone
                        self.stop_monitoring().await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }

                result = join_in_flight(&mut self.in_flight) => {
                    self.finish_refresh(result);
                }

                event = recv_location(&mut self.location_rx) => {
                    match event {
                        Some(event) => self.handle_location_event(event),
                        None => {
                            tracing::debug!("Location source closed its channel");
                            self.location_rx = None;
                        }
                    }
                }
            }
        }

        tracing::debug!("Geofence coordinator task stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns `false` when the task should exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { reply } => self.start(reply),
            Command::Stop { reply } => {
                self.stop_monitoring().await;
                let _ = reply.send(());
            }
            Command::ForceRefresh { reply } => self.force_refresh(reply),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                self.stop_monitoring().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, reply: OutcomeReply) {
        if self.phase.is_running() {
            let _ = reply.send(Err(CoordinatorError::AlreadyStarted));
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.source.subscribe(tx);
        self.location_rx = Some(rx);
        self.phase = CoordinatorPhase::Monitoring;
        self.needs_initial_refresh = true;

        tracing::info!(
            capacity = self.selector.max_regions(),
            distance_threshold_m = self.policy.distance_threshold_meters,
            time_threshold_secs = self.policy.time_threshold.as_secs(),
            "Geofence monitoring started"
        );

        self.begin_refresh(RefreshTrigger::FirstRefresh, vec![reply]);
    }

    fn force_refresh(&mut self, reply: OutcomeReply) {
        if !self.phase.is_running() {
            let _ = reply.send(Err(CoordinatorError::NotRunning));
            return;
        }

        if self.in_flight.is_some() {
            tracing::debug!("Manual refresh queued behind in-flight cycle");
            self.pending_forced.get_or_insert(RefreshTrigger::Manual);
            self.next_waiters.push(reply);
            return;
        }

        self.begin_refresh(RefreshTrigger::Manual, vec![reply]);
    }

    /// Cancel any cycle, unsubscribe and deregister everything.
    ///
    /// Refresh state is kept so a later start can compare against it.
    async fn stop_monitoring(&mut self) {
        let was_running = self.phase.is_running();

        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(trigger = %in_flight.trigger, "Cancelling in-flight refresh");
            in_flight.cancel.cancel();
            for waiter in in_flight.waiters {
                let _ = waiter.send(Ok(RefreshOutcome::Cancelled));
            }
            // The task finishes on its own; its result is never applied
            drop(in_flight.handle);
        }
        for waiter in self.next_waiters.drain(..) {
            let _ = waiter.send(Ok(RefreshOutcome::Cancelled));
        }
        self.pending_forced = None;
        self.pending_position = false;
        self.needs_initial_refresh = false;

        self.source.unsubscribe();
        self.location_rx = None;
        self.phase = CoordinatorPhase::Idle;

        let cleared = self.monitor.lock().await.clear().await;
        self.store.apply_active(&HashSet::new());
        self.monitored_ids.clear();

        if was_running {
            tracing::info!(
                deregistered = cleared.deregistered.len(),
                "Geofence monitoring stopped"
            );
        }
    }

    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            phase: self.phase,
            refresh_state: self.state,
            monitored_ids: self.monitored_ids.clone(),
            refresh_cycles: self.refresh_cycles,
            failed_cycles: self.failed_cycles,
            consecutive_failures: self.consecutive_failures,
            refresh_pending: self.pending_position || self.pending_forced.is_some(),
            ranking_client: self.ranking.as_ref().map(|c| c.name()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Location events
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_location_event(&mut self, event: LocationEvent) {
        if !self.phase.is_running() {
            return;
        }

        let fix = event.position();
        if let Some(position) = fix.filter(|p| !p.is_valid()) {
            tracing::debug!(
                event = event.name(),
                position = %position,
                "Ignoring event with invalid position"
            );
            return;
        }

        match event {
            LocationEvent::PositionUpdate {
                accuracy_meters, ..
            } => {
                if !self.config.accepts_accuracy(accuracy_meters) {
                    tracing::debug!(accuracy_m = accuracy_meters, "Ignoring unusable position fix");
                    return;
                }
                if let Some(position) = fix {
                    self.on_position(position);
                }
            }
            LocationEvent::VisitDetected { .. } => {
                if let Some(position) = fix {
                    self.on_visit(position);
                }
            }
            LocationEvent::RegionEntered { region_id } => {
                let stamped = self.store.record_entry(&region_id, Utc::now());
                if !stamped {
                    tracing::debug!(region_id = %region_id, "Entered region unknown to the store");
                }
                tracing::info!(region_id = %region_id, "Region entered");
                self.publish(RegionEvent::new(RegionEventKind::Enter, region_id.as_str()));
            }
            LocationEvent::RegionExited { region_id } => {
                tracing::debug!(region_id = %region_id, "Region exited");
                self.publish(RegionEvent::new(RegionEventKind::Exit, region_id.as_str()));
            }
            LocationEvent::MonitoringFailed { region_id, error } => {
                tracing::warn!(region_id = %region_id, error = %error, "Platform reported monitoring failure");
                self.publish(RegionEvent::monitoring_failed(region_id.as_str(), error));
            }
        }
    }

    fn on_position(&mut self, position: GeoPoint) {
        self.state.update_position(position);

        if self.in_flight.is_some() {
            self.pending_position = true;
            return;
        }
        self.evaluate_and_refresh();
    }

    fn on_visit(&mut self, position: GeoPoint) {
        self.state.update_position(position);

        if self.in_flight.is_some() {
            self.pending_forced.get_or_insert(RefreshTrigger::Visit);
            return;
        }
        self.begin_refresh(RefreshTrigger::Visit, Vec::new());
    }

    fn evaluate_and_refresh(&mut self) {
        let trigger = if self.needs_initial_refresh {
            Some(RefreshTrigger::FirstRefresh)
        } else {
            self.policy.evaluate(&self.state, Instant::now(), false)
        };

        match trigger {
            Some(trigger) => self.begin_refresh(trigger, Vec::new()),
            None => {
                if let Some(moved) = self.state.distance_since_refresh_m() {
                    tracing::trace!(moved_m = moved, "Refresh not due");
                }
            }
        }
    }

    /// Attach the resolved record and broadcast.
    fn publish(&self, event: RegionEvent) {
        let location = self.store.get(&event.region_id);
        // No receivers is fine
        let _ = self.events.send(event.with_location(location));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh cycles
    // ─────────────────────────────────────────────────────────────────────────

    fn begin_refresh(&mut self, trigger: RefreshTrigger, waiters: Vec<OutcomeReply>) {
        debug_assert!(self.in_flight.is_none(), "refresh already in flight");

        let Some(position) = self.state.current_position else {
            tracing::debug!(trigger = %trigger, "No position yet, refresh deferred");
            for waiter in waiters {
                let _ = waiter.send(Ok(RefreshOutcome::Deferred));
            }
            return;
        };

        tracing::debug!(trigger = %trigger, position = %position, "Starting refresh cycle");

        let cancel = CancellationToken::new();
        let cycle = RefreshCycle {
            trigger,
            position,
            store: Arc::clone(&self.store),
            ranking: self.ranking.clone(),
            ranking_timeout: self.config.ranking_timeout,
            selector: self.selector,
            monitor: Arc::clone(&self.monitor),
            cancel: cancel.clone(),
        };

        self.phase = CoordinatorPhase::Refreshing;
        self.in_flight = Some(InFlight {
            trigger,
            cancel,
            handle: tokio::spawn(cycle.run()),
            waiters,
        });
    }

    fn finish_refresh(&mut self, result: Result<CycleResult, JoinError>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        self.phase = CoordinatorPhase::Monitoring;

        let outcome = match result {
            Ok(CycleResult::Completed(report)) => {
                self.state.commit_refresh(report.position, Instant::now());
                self.needs_initial_refresh = false;
                self.refresh_cycles += 1;
                self.consecutive_failures = 0;

                let active: HashSet<String> = report.monitored.iter().cloned().collect();
                self.store.apply_active(&active);
                self.monitored_ids = report.monitored.clone();

                for (region_id, error) in &report.reconcile.failed {
                    self.publish(RegionEvent::monitoring_failed(
                        region_id.as_str(),
                        error.to_string(),
                    ));
                }

                tracing::info!(
                    trigger = %report.trigger,
                    source = report.source,
                    selected = report.selected.len(),
                    registered = report.reconcile.registered.len(),
                    deregistered = report.reconcile.deregistered.len(),
                    failed = report.reconcile.failed.len(),
                    monitored = report.monitored.len(),
                    duration_ms = report.duration.as_millis() as u64,
                    "Refresh cycle completed"
                );
                RefreshOutcome::Completed(report)
            }
            Ok(CycleResult::Failed(error)) => self.record_failure(in_flight.trigger, error),
            Ok(CycleResult::Cancelled) => RefreshOutcome::Cancelled,
            Err(e) => self.record_failure(in_flight.trigger, RefreshError::Task(e.to_string())),
        };

        for waiter in in_flight.waiters {
            let _ = waiter.send(Ok(outcome.clone()));
        }

        self.run_follow_up();
    }

    fn record_failure(&mut self, trigger: RefreshTrigger, error: RefreshError) -> RefreshOutcome {
        self.failed_cycles += 1;
        self.consecutive_failures += 1;
        tracing::warn!(
            trigger = %trigger,
            error = %error,
            consecutive_failures = self.consecutive_failures,
            "Refresh cycle failed, keeping current regions"
        );
        RefreshOutcome::Failed(error)
    }

    /// Start the coalesced follow-up cycle, if any.
    fn run_follow_up(&mut self) {
        let forced = self.pending_forced.take();
        let position_changed = mem::take(&mut self.pending_position);
        let waiters = mem::take(&mut self.next_waiters);

        match forced {
            Some(trigger) => self.begin_refresh(trigger, waiters),
            None => {
                debug_assert!(waiters.is_empty());
                if position_changed {
                    self.evaluate_and_refresh();
                }
            }
        }
    }
}

async fn join_in_flight(in_flight: &mut Option<InFlight>) -> Result<CycleResult, JoinError> {
    match in_flight {
        Some(in_flight) => (&mut in_flight.handle).await,
        None => std::future::pending().await,
    }
}

async fn recv_location(
    rx: &mut Option<mpsc::UnboundedReceiver<LocationEvent>>,
) -> Option<LocationEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
