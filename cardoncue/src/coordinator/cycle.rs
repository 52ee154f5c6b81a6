//! A single refresh cycle: snapshot, select, reconcile.
//!
//! Runs in its own task so the coordinator keeps draining location events
//! while the ranking service and the monitoring primitive are awaited.
//!
//! # Cancellation
//!
//! The cycle checks its token while waiting on the ranking service and again
//! right after acquiring the monitor lock. `stop` cancels the token before it
//! takes the same lock, so a cancelled cycle never reconciles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RefreshError, RefreshReport};
use crate::geo::GeoPoint;
use crate::location::LocationStore;
use crate::monitor::CapacityLimitedMonitor;
use crate::ranking::{RankingError, RegionRankingClient};
use crate::refresh::RefreshTrigger;
use crate::selector::RegionSelector;

/// Result handed back to the coordinator task.
#[derive(Debug)]
pub(super) enum CycleResult {
    Completed(RefreshReport),
    Failed(RefreshError),
    Cancelled,
}

/// Everything a refresh cycle needs, owned so it can be moved into a task.
pub(super) struct RefreshCycle {
    pub trigger: RefreshTrigger,
    pub position: GeoPoint,
    pub store: Arc<dyn LocationStore>,
    pub ranking: Option<Arc<dyn RegionRankingClient>>,
    pub ranking_timeout: Duration,
    pub selector: RegionSelector,
    pub monitor: Arc<Mutex<CapacityLimitedMonitor>>,
    pub cancel: CancellationToken,
}

impl RefreshCycle {
    pub async fn run(self) -> CycleResult {
        let started = Instant::now();

        // Snapshot before the first await
        let mut candidates = self.store.all_candidates();
        let owned_tags = self.store.owned_tags();

        let (selection, source) = match self.ranking {
            Some(ref client) => {
                let mut interest_tags: Vec<String> = owned_tags.iter().cloned().collect();
                interest_tags.sort();

                let ranked = tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => return CycleResult::Cancelled,

                    result = tokio::time::timeout(
                        self.ranking_timeout,
                        client.rank(self.position, &interest_tags, self.selector.max_regions()),
                    ) => result,
                };

                let ranked = match ranked {
                    Ok(Ok(ranked)) => ranked,
                    Ok(Err(e)) => return CycleResult::Failed(e.into()),
                    Err(_) => {
                        return CycleResult::Failed(
                            RankingError::Timeout {
                                timeout_ms: self.ranking_timeout.as_millis() as u64,
                            }
                            .into(),
                        )
                    }
                };

                tracing::debug!(
                    client = client.name(),
                    returned = ranked.len(),
                    "Ranking service responded"
                );

                let selection = self.selector.select_ranked(
                    &ranked,
                    self.position,
                    &mut candidates,
                    &owned_tags,
                );
                (selection, client.name())
            }
            None => (
                self.selector
                    .select(&mut candidates, self.position, &owned_tags),
                "local",
            ),
        };

        let desired = selection.desired_regions();

        let mut monitor = self.monitor.lock().await;
        if self.cancel.is_cancelled() {
            tracing::debug!(trigger = %self.trigger, "Refresh cancelled before reconcile");
            return CycleResult::Cancelled;
        }
        let reconcile = monitor.reconcile(&desired).await;
        let monitored = monitor.registered_ids();
        drop(monitor);

        CycleResult::Completed(RefreshReport {
            trigger: self.trigger,
            position: self.position,
            source,
            selected: selection.ids().into_iter().map(String::from).collect(),
            considered: selection.considered,
            skipped_invalid: selection.skipped_invalid,
            reconcile,
            monitored,
            duration: started.elapsed(),
        })
    }
}
