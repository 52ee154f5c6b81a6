//! Configuration file support.
//!
//! Settings live in an INI file at `~/.cardoncue/config.ini`. Missing keys
//! fall back to the in-code defaults; unknown keys are ignored so older
//! binaries can read newer files.
//!
//! # Example
//!
//! ```ini
//! [geofence]
//! max_regions = 20
//! distance_threshold_m = 500
//! time_threshold_secs = 21600
//! default_radius_m = 100
//! max_accuracy_m = none
//!
//! [ranking]
//! endpoint = https://api.example.com/v1/regions/refresh
//! api_token = secret
//! timeout_secs = 10
//!
//! [logging]
//! level = info
//! directory = /var/log/cardoncue
//! ```

mod keys;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::coordinator::GeofenceConfig;
use crate::location::DEFAULT_RADIUS_METERS;
use crate::ranking::{HttpRankingClient, RankingError, DEFAULT_RANKING_TIMEOUT};
use crate::refresh::{DEFAULT_DISTANCE_THRESHOLD_METERS, DEFAULT_TIME_THRESHOLD};
use crate::selector::DEFAULT_MAX_CONCURRENT_REGIONS;

pub use keys::ConfigKey;

/// Directory name under the home directory.
const CONFIG_DIR_NAME: &str = ".cardoncue";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Accepted log levels.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Errors from loading, parsing or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("Invalid config file: {0}")]
    Parse(String),

    /// A key holds a value of the wrong type or range.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// `section.key` does not name a known setting.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[geofence]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceSettings {
    pub max_regions: usize,
    pub distance_threshold_m: f64,
    pub time_threshold_secs: u64,
    pub default_radius_m: f64,
    /// `None` (the default) disables the accuracy filter.
    pub max_accuracy_m: Option<f64>,
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        Self {
            max_regions: DEFAULT_MAX_CONCURRENT_REGIONS,
            distance_threshold_m: DEFAULT_DISTANCE_THRESHOLD_METERS,
            time_threshold_secs: DEFAULT_TIME_THRESHOLD.as_secs(),
            default_radius_m: DEFAULT_RADIUS_METERS,
            max_accuracy_m: None,
        }
    }
}

/// `[ranking]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingSettings {
    /// Ranking endpoint. Local selection is used when unset.
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            timeout_secs: DEFAULT_RANKING_TIMEOUT.as_secs(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    /// Directory for daily-rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub geofence: GeofenceSettings,
    pub ranking: RankingSettings,
    pub logging: LoggingSettings,
}

/// `~/.cardoncue`, or `./.cardoncue` when no home directory is known.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

impl ConfigFile {
    /// Load from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        Ok(config)
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Render as INI. Unset optional values are omitted.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Coordinator configuration described by this file.
    pub fn to_geofence_config(&self) -> GeofenceConfig {
        GeofenceConfig::default()
            .with_max_concurrent_regions(self.geofence.max_regions)
            .with_distance_threshold(self.geofence.distance_threshold_m)
            .with_time_threshold(Duration::from_secs(self.geofence.time_threshold_secs))
            .with_default_radius(self.geofence.default_radius_m)
            .with_max_position_accuracy(self.geofence.max_accuracy_m)
            .with_ranking_timeout(self.ranking_timeout())
    }

    /// Ranking request timeout.
    pub fn ranking_timeout(&self) -> Duration {
        Duration::from_secs(self.ranking.timeout_secs)
    }

    /// HTTP ranking client, if an endpoint is configured.
    pub fn ranking_client(&self) -> Result<Option<HttpRankingClient>, RankingError> {
        let Some(ref endpoint) = self.ranking.endpoint else {
            return Ok(None);
        };
        let client = HttpRankingClient::with_timeout(endpoint.clone(), self.ranking_timeout())?;
        Ok(Some(match self.ranking.api_token {
            Some(ref token) => client.with_api_token(token.clone()),
            None => client,
        }))
    }
}

/// Parse `value` for `key`, reporting failures as [`ConfigError::InvalidValue`].
fn parse_value<T>(key: ConfigKey, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| invalid(key, value, e.to_string()))
}

fn invalid(key: ConfigKey, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.name(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parse a strictly positive, finite number of meters.
fn parse_meters(key: ConfigKey, value: &str) -> Result<f64, ConfigError> {
    let meters: f64 = parse_value(key, value)?;
    if meters.is_finite() && meters > 0.0 {
        Ok(meters)
    } else {
        Err(invalid(key, value, "must be a positive number of meters"))
    }
}

/// Treat empty, `none` and `off` as unset.
fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.to_geofence_config(), GeofenceConfig::default());
    }

    #[test]
    fn test_parse_all_sections() {
        let text = "\
[geofence]
max_regions = 10
distance_threshold_m = 250.5
time_threshold_secs = 3600
default_radius_m = 80
max_accuracy_m = 2500

[ranking]
endpoint = https://example.com/api/regions/refresh
api_token = abc
timeout_secs = 5

[logging]
level = debug
directory = /tmp/cardoncue-logs
";
        let config = ConfigFile::parse(text).unwrap();
        assert_eq!(config.geofence.max_regions, 10);
        assert_eq!(config.geofence.distance_threshold_m, 250.5);
        assert_eq!(config.geofence.max_accuracy_m, Some(2500.0));
        assert_eq!(config.ranking.api_token.as_deref(), Some("abc"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/tmp/cardoncue-logs"))
        );

        let geofence = config.to_geofence_config();
        assert_eq!(geofence.max_concurrent_regions, 10);
        assert_eq!(geofence.time_threshold, Duration::from_secs(3600));
        assert_eq!(geofence.ranking_timeout, Duration::from_secs(5));
        assert_eq!(geofence.max_position_accuracy_meters, Some(2500.0));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = ConfigFile::parse("[geofence]\nshiny = yes\n[extra]\nfoo = bar\n").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ConfigFile::parse("[geofence]\nmax_regions = lots\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "geofence.max_regions");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(ConfigFile::parse("[geofence]\ndistance_threshold_m = -5\n").is_err());
        assert!(ConfigFile::parse("[geofence]\nmax_regions = 0\n").is_err());
        assert!(ConfigFile::parse("[logging]\nlevel = loud\n").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.geofence.max_regions = 15;
        config.ranking.endpoint = Some("https://example.com/rank".into());
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[geofence]"));
        assert!(!text.contains("api_token"), "unset values are omitted");
    }

    #[test]
    fn test_ranking_client_from_config() {
        let mut config = ConfigFile::default();
        assert!(config.ranking_client().unwrap().is_none());

        config.ranking.endpoint = Some("https://example.com/rank".into());
        let client = config.ranking_client().unwrap().unwrap();
        assert_eq!(client.endpoint(), "https://example.com/rank");
    }

    #[test]
    fn test_config_file_path_location() {
        let path = config_file_path();
        assert!(path.ends_with(".cardoncue/config.ini"));
    }
}
