//! Input helpers shared across CLI commands.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use cardoncue::{InMemoryLocationStore, LocationOfInterest};

use crate::error::CliError;

fn open(path: &Path) -> Result<BufReader<File>, CliError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CliError::Input {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_error(path: &Path, e: serde_json::Error) -> CliError {
    CliError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Read a JSON array of saved places.
pub fn load_candidates(path: &Path) -> Result<Vec<LocationOfInterest>, CliError> {
    serde_json::from_reader(open(path)?).map_err(|e| parse_error(path, e))
}

/// Build a store from a candidates file and the owned tags given on the command line.
pub fn load_store(path: &Path, owned: &[String]) -> Result<InMemoryLocationStore, CliError> {
    let store = InMemoryLocationStore::from_json_reader(open(path)?).map_err(|e| parse_error(path, e))?;
    Ok(store.with_owned_tags(owned.iter().cloned()))
}

/// Resolve the monitoring budget: CLI flag first, then the config file.
pub fn resolve_capacity(cli_capacity: Option<usize>, configured: usize) -> Result<usize, CliError> {
    match cli_capacity.unwrap_or(configured) {
        0 => Err(CliError::Config(
            "Capacity must be at least 1. Use --capacity or set geofence.max_regions.".to_string(),
        )),
        capacity => Ok(capacity),
    }
}

/// Format a distance for display.
pub fn format_distance(meters: Option<f64>) -> String {
    match meters {
        Some(m) if m >= 1_000.0 => format!("{:.2} km", m / 1_000.0),
        Some(m) => format!("{:.0} m", m),
        None => "-".to_string(),
    }
}
