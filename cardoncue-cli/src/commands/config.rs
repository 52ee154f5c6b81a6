//! Configuration management CLI commands.
//!
//! `config get`, `config set`, `config list` and `config path` read and edit
//! the INI file without touching anything else in it.

use std::path::Path;

use cardoncue::config::{ConfigFile, ConfigKey};
use clap::Subcommand;

use crate::error::CliError;

/// Placeholder shown instead of secret values.
const MASKED: &str = "********";

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., geofence.max_regions)
        key: String,
    },

    /// Set a configuration value (an empty value clears optional keys)
    Set {
        /// Configuration key in format section.key (e.g., ranking.endpoint)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(path, &key),
        ConfigCommands::Set { key, value } => run_set(path, &key, &value),
        ConfigCommands::List => run_list(path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'cardoncue config list' to see available keys.",
            key
        ))
    })
}

/// Display form of a value: masked when secret, `(not set)` when empty.
fn display_value(key: ConfigKey, value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else if key.is_secret() {
        MASKED.to_string()
    } else {
        value.to_string()
    }
}

fn run_get(path: &Path, key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load_from(path)?;
    println!("{}", display_value(config_key, &config_key.get(&config)));
    Ok(())
}

fn run_set(path: &Path, key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;

    let mut config = ConfigFile::load_from(path)?;
    config_key
        .set(&mut config, value)
        .map_err(|e| CliError::Config(e.to_string()))?;
    config.save_to(path)?;

    println!(
        "Set {} = {}",
        config_key.name(),
        display_value(config_key, &config_key.get(&config))
    );
    Ok(())
}

fn run_list(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = "";
    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        println!(
            "  {} = {}",
            key.key_name(),
            display_value(*key, &key.get(&config))
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secret_values_are_masked() {
        assert_eq!(
            display_value(ConfigKey::RankingApiToken, "abc123"),
            MASKED
        );
        assert_eq!(display_value(ConfigKey::RankingApiToken, ""), "(not set)");
        assert_eq!(display_value(ConfigKey::GeofenceMaxRegions, "20"), "20");
    }

    #[test]
    fn test_set_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        run(
            ConfigCommands::Set {
                key: "geofence.max_regions".to_string(),
                value: "12".to_string(),
            },
            &path,
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.geofence.max_regions, 12);
    }

    #[test]
    fn test_set_rejects_unknown_key_and_bad_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        let unknown = run(
            ConfigCommands::Set {
                key: "geofence.colour".to_string(),
                value: "red".to_string(),
            },
            &path,
        );
        assert!(matches!(unknown, Err(CliError::Config(_))));

        let bad = run(
            ConfigCommands::Set {
                key: "geofence.max_regions".to_string(),
                value: "0".to_string(),
            },
            &path,
        );
        assert!(matches!(bad, Err(CliError::Config(_))));
        assert!(!path.exists());
    }
}
