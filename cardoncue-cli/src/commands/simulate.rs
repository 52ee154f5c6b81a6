//! Simulate command - replay a recorded location track through the coordinator.
//!
//! The track is JSON Lines. Each line is either a location event, tagged by
//! `type` (`position_update`, `visit_detected`, `region_entered`,
//! `region_exited`, `monitoring_failed`), or a pause:
//!
//! ```text
//! {"type": "position_update", "latitude": 47.6062, "longitude": -122.3321, "accuracy_meters": 25}
//! {"type": "sleep", "millis": 500}
//! {"type": "visit_detected", "latitude": 47.6101, "longitude": -122.3420}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cardoncue::{
    ChannelLocationSource, CoordinatorPhase, CoordinatorStatus, GeofenceCoordinator,
    InMemoryRegionMonitor, LocationEvent, RegionEvent, RegionRankingClient,
};
use tokio::sync::broadcast;

use super::common::{load_store, resolve_capacity};
use crate::error::CliError;
use crate::runner::CliRunner;

/// How often to poll coordinator status while a refresh settles.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub candidates: PathBuf,
    pub track: PathBuf,
    pub owned: Vec<String>,
    pub capacity: Option<usize>,
    pub local: bool,
}

/// One step of a recorded track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackStep {
    /// Deliver an event to the coordinator.
    Event(LocationEvent),
    /// Pause before the next step.
    Sleep(Duration),
}

/// Parse a JSON Lines track. Blank lines and `#` comments are skipped.
pub fn parse_track(path: &Path, text: &str) -> Result<Vec<TrackStep>, CliError> {
    let mut steps = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |message: String| CliError::Parse {
            path: path.to_path_buf(),
            message: format!("line {}: {}", index + 1, message),
        };

        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| parse_error(e.to_string()))?;

        if value.get("type").and_then(|t| t.as_str()) == Some("sleep") {
            let millis = value
                .get("millis")
                .and_then(|m| m.as_u64())
                .ok_or_else(|| parse_error("sleep needs a non-negative 'millis'".to_string()))?;
            steps.push(TrackStep::Sleep(Duration::from_millis(millis)));
        } else {
            let event: LocationEvent =
                serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;
            steps.push(TrackStep::Event(event));
        }
    }

    Ok(steps)
}

/// Run the simulate command.
pub fn run(runner: &CliRunner, args: SimulateArgs) -> Result<(), CliError> {
    runner.log_startup("simulate");
    let config = runner.config();

    let capacity = resolve_capacity(args.capacity, config.geofence.max_regions)?;
    let geofence_config = config
        .to_geofence_config()
        .with_max_concurrent_regions(capacity);
    let settle_timeout = geofence_config.ranking_timeout + Duration::from_secs(1);

    let text = std::fs::read_to_string(&args.track).map_err(|source| CliError::Input {
        path: args.track.clone(),
        source,
    })?;
    let steps = parse_track(&args.track, &text)?;
    let store = Arc::new(load_store(&args.candidates, &args.owned)?);

    let ranking: Option<Arc<dyn RegionRankingClient>> = if args.local {
        None
    } else {
        config
            .ranking_client()?
            .map(|client| Arc::new(client) as Arc<dyn RegionRankingClient>)
    };

    println!("CardOnCue Geofence Simulation v{}", cardoncue::VERSION);
    println!("==================================");
    println!();
    println!("Places:   {}", store.len());
    println!("Steps:    {}", steps.len());
    println!("Capacity: {}", capacity);
    println!(
        "Ranking:  {}",
        ranking.as_ref().map(|c| c.name()).unwrap_or("local")
    );
    println!();

    let runtime = runner.runtime()?;
    runtime.block_on(async move {
        let platform = Arc::new(InMemoryRegionMonitor::new(capacity).with_op_log_capacity(0));
        let source = Arc::new(ChannelLocationSource::new());

        let mut builder = GeofenceCoordinator::builder(
            geofence_config,
            store,
            platform.clone(),
            source.clone(),
        );
        if let Some(client) = ranking {
            builder = builder.with_ranking_client(client);
        }
        let coordinator = builder.spawn();

        let printer = tokio::spawn(print_events(coordinator.subscribe()));

        let outcome = coordinator.start().await?;
        println!("start: {}", outcome);

        let mut last_cycles = 0;
        for step in steps {
            match step {
                TrackStep::Sleep(duration) => tokio::time::sleep(duration).await,
                TrackStep::Event(event) => {
                    let name = event.name();
                    if !source.publish(event) {
                        tracing::warn!(event = name, "Location source not subscribed, event dropped");
                        continue;
                    }
                    let status = settle(&coordinator, settle_timeout).await?;
                    if status.refresh_cycles + status.failed_cycles > last_cycles {
                        last_cycles = status.refresh_cycles + status.failed_cycles;
                        println!("refresh: {} -> {:?}", status, status.monitored_ids);
                    }
                }
            }
        }

        let status = settle(&coordinator, settle_timeout).await?;
        coordinator.shutdown().await?;
        // Printer ends once every sender of the event channel is gone
        drop(coordinator);
        let _ = printer.await;

        println!();
        println!("Final:   {}", status);
        println!("Peak:    {} concurrent regions", platform.peak());
        println!("Active:  {:?}", status.monitored_ids);
        Ok::<(), CliError>(())
    })
}

/// Wait until no refresh is running or queued, or `timeout` passes.
async fn settle(
    coordinator: &GeofenceCoordinator,
    timeout: Duration,
) -> Result<CoordinatorStatus, CliError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        // Let the coordinator pick up the event before asking for status
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        let status = coordinator.status().await?;
        let busy = status.phase == CoordinatorPhase::Refreshing || status.refresh_pending;
        if !busy || tokio::time::Instant::now() >= deadline {
            return Ok(status);
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<RegionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let label = event
                    .location
                    .as_ref()
                    .and_then(|l| l.name.as_deref())
                    .unwrap_or("");
                match event.error {
                    Some(ref error) => {
                        println!("event: {} {} ({})", event.kind, event.region_id, error)
                    }
                    None => println!("event: {} {} {}", event.kind, event.region_id, label),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_mixes_events_and_sleeps() {
        let text = r#"
# commute
{"type": "position_update", "latitude": 47.6, "longitude": -122.3, "accuracy_meters": 20}
{"type": "sleep", "millis": 250}
{"type": "visit_detected", "latitude": 47.61, "longitude": -122.34}
{"type": "region_entered", "region_id": "store-1"}
"#;
        let steps = parse_track(Path::new("track.jsonl"), text).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[1], TrackStep::Sleep(Duration::from_millis(250)));
        assert!(matches!(
            steps[2],
            TrackStep::Event(LocationEvent::VisitDetected { .. })
        ));
    }

    #[test]
    fn test_parse_track_reports_line_numbers() {
        let text = "{\"type\": \"sleep\", \"millis\": 1}\n{\"type\": \"teleport\"}\n";
        let err = parse_track(Path::new("track.jsonl"), text).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_parse_track_rejects_bad_sleep() {
        let text = r#"{"type": "sleep", "millis": -5}"#;
        assert!(parse_track(Path::new("track.jsonl"), text).is_err());
    }
}
