//! Select command - show which saved places would be monitored from a position.

use std::collections::HashSet;
use std::path::PathBuf;

use cardoncue::selector::SelectedRegion;
use cardoncue::{GeoPoint, RegionSelector};
use serde::Serialize;

use super::common::{format_distance, load_candidates, resolve_capacity};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the select command.
pub struct SelectArgs {
    pub candidates: PathBuf,
    pub latitude: f64,
    pub longitude: f64,
    pub owned: Vec<String>,
    pub capacity: Option<usize>,
    pub json: bool,
}

/// One output row.
#[derive(Debug, Serialize)]
struct SelectionRow<'a> {
    rank: usize,
    id: &'a str,
    tier: &'static str,
    distance_m: Option<f64>,
    radius_m: f64,
}

impl<'a> SelectionRow<'a> {
    fn new(rank: usize, entry: &'a SelectedRegion) -> Self {
        Self {
            rank,
            id: &entry.region.region_id,
            tier: if entry.priority { "owned" } else { "nearby" },
            distance_m: entry.distance_m,
            radius_m: entry.region.radius_meters,
        }
    }
}

/// Run the select command.
pub fn run(runner: &CliRunner, args: SelectArgs) -> Result<(), CliError> {
    runner.log_startup("select");
    let config = runner.config();

    let position = GeoPoint::new(args.latitude, args.longitude);
    if !position.is_valid() {
        return Err(CliError::Config(format!(
            "Position {}, {} is out of range",
            args.latitude, args.longitude
        )));
    }

    let capacity = resolve_capacity(args.capacity, config.geofence.max_regions)?;
    let selector =
        RegionSelector::new(capacity).with_default_radius(config.geofence.default_radius_m);

    let mut candidates = load_candidates(&args.candidates)?;
    let owned: HashSet<String> = args.owned.into_iter().collect();
    let selection = selector.select(&mut candidates, position, &owned);

    if args.json {
        for (index, entry) in selection.regions.iter().enumerate() {
            let row = SelectionRow::new(index + 1, entry);
            let line = serde_json::to_string(&row).map_err(|e| CliError::Parse {
                path: args.candidates.clone(),
                message: e.to_string(),
            })?;
            println!("{}", line);
        }
        return Ok(());
    }

    println!(
        "Selected {} of {} places (capacity {}, {} owned, {} skipped without coordinates)",
        selection.len(),
        selection.considered,
        capacity,
        selection.priority_count(),
        selection.skipped_invalid
    );
    println!();

    for (index, entry) in selection.regions.iter().enumerate() {
        let row = SelectionRow::new(index + 1, entry);
        println!(
            "{:>3}. {:<24} {:<7} {:>10}  r={:.0} m",
            row.rank,
            row.id,
            row.tier,
            format_distance(row.distance_m),
            row.radius_m
        );
    }

    Ok(())
}
