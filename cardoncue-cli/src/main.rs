//! CardOnCue CLI - inspect and replay geofence rotation.
//!
//! ```text
//! cardoncue select --candidates places.json --lat 47.6062 --lon -122.3321 --owned costco
//! cardoncue simulate --candidates places.json --track commute.jsonl
//! cardoncue config set geofence.max_regions 15
//! ```

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use cardoncue::config::config_file_path;
use commands::config::ConfigCommands;
use commands::select::SelectArgs;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "cardoncue", version, about = "CardOnCue geofence rotation tools")]
struct Cli {
    /// Configuration file (defaults to ~/.cardoncue/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, overriding [logging] level (e.g. debug, cardoncue=trace)
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show which saved places would be monitored from a position
    Select {
        /// JSON array of saved places
        #[arg(long, value_name = "FILE")]
        candidates: PathBuf,

        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Tags the user holds (repeatable); matching places are monitored first
        #[arg(long = "owned", value_name = "TAG")]
        owned: Vec<String>,

        /// Monitoring budget (defaults to geofence.max_regions)
        #[arg(long)]
        capacity: Option<usize>,

        /// Print one JSON object per selected place
        #[arg(long)]
        json: bool,
    },

    /// Replay a JSON Lines location track through the coordinator
    Simulate {
        /// JSON array of saved places
        #[arg(long, value_name = "FILE")]
        candidates: PathBuf,

        /// JSON Lines track of location events and sleeps
        #[arg(long, value_name = "FILE")]
        track: PathBuf,

        /// Tags the user holds (repeatable)
        #[arg(long = "owned", value_name = "TAG")]
        owned: Vec<String>,

        /// Monitoring budget (defaults to geofence.max_regions)
        #[arg(long)]
        capacity: Option<usize>,

        /// Ignore the configured ranking service and select locally
        #[arg(long)]
        local: bool,
    },

    /// View or edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => {
            let path = cli.config.unwrap_or_else(config_file_path);
            commands::config::run(command, &path)
        }
        Commands::Select {
            candidates,
            lat,
            lon,
            owned,
            capacity,
            json,
        } => {
            let runner = CliRunner::new(cli.config.as_deref(), cli.log_level.as_deref())?;
            commands::select::run(
                &runner,
                SelectArgs {
                    candidates,
                    latitude: lat,
                    longitude: lon,
                    owned,
                    capacity,
                    json,
                },
            )
        }
        Commands::Simulate {
            candidates,
            track,
            owned,
            capacity,
            local,
        } => {
            let runner = CliRunner::new(cli.config.as_deref(), cli.log_level.as_deref())?;
            commands::simulate::run(
                &runner,
                SimulateArgs {
                    candidates,
                    track,
                    owned,
                    capacity,
                    local,
                },
            )
        }
    }
}
