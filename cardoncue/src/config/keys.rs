//! Addressable configuration keys (`section.key`).
//!
//! Used by the file parser and by the `config get/set/list` CLI commands.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{invalid, is_unset, parse_meters, parse_value, ConfigError, ConfigFile, LOG_LEVELS};

/// A single setting in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    GeofenceMaxRegions,
    GeofenceDistanceThreshold,
    GeofenceTimeThreshold,
    GeofenceDefaultRadius,
    GeofenceMaxAccuracy,
    RankingEndpoint,
    RankingApiToken,
    RankingTimeout,
    LoggingLevel,
    LoggingDirectory,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::GeofenceMaxRegions,
    ConfigKey::GeofenceDistanceThreshold,
    ConfigKey::GeofenceTimeThreshold,
    ConfigKey::GeofenceDefaultRadius,
    ConfigKey::GeofenceMaxAccuracy,
    ConfigKey::RankingEndpoint,
    ConfigKey::RankingApiToken,
    ConfigKey::RankingTimeout,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingDirectory,
];

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::GeofenceMaxRegions
            | ConfigKey::GeofenceDistanceThreshold
            | ConfigKey::GeofenceTimeThreshold
            | ConfigKey::GeofenceDefaultRadius
            | ConfigKey::GeofenceMaxAccuracy => "geofence",
            ConfigKey::RankingEndpoint | ConfigKey::RankingApiToken | ConfigKey::RankingTimeout => {
                "ranking"
            }
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::GeofenceMaxRegions => "max_regions",
            ConfigKey::GeofenceDistanceThreshold => "distance_threshold_m",
            ConfigKey::GeofenceTimeThreshold => "time_threshold_secs",
            ConfigKey::GeofenceDefaultRadius => "default_radius_m",
            ConfigKey::GeofenceMaxAccuracy => "max_accuracy_m",
            ConfigKey::RankingEndpoint => "endpoint",
            ConfigKey::RankingApiToken => "api_token",
            ConfigKey::RankingTimeout => "timeout_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Returns `true` for values that should not be echoed.
    pub fn is_secret(&self) -> bool {
        matches!(self, ConfigKey::RankingApiToken)
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::GeofenceMaxRegions => config.geofence.max_regions.to_string(),
            ConfigKey::GeofenceDistanceThreshold => {
                config.geofence.distance_threshold_m.to_string()
            }
            ConfigKey::GeofenceTimeThreshold => config.geofence.time_threshold_secs.to_string(),
            ConfigKey::GeofenceDefaultRadius => config.geofence.default_radius_m.to_string(),
            ConfigKey::GeofenceMaxAccuracy => match config.geofence.max_accuracy_m {
                Some(meters) => meters.to_string(),
                None => "none".to_string(),
            },
            ConfigKey::RankingEndpoint => config.ranking.endpoint.clone().unwrap_or_default(),
            ConfigKey::RankingApiToken => config.ranking.api_token.clone().unwrap_or_default(),
            ConfigKey::RankingTimeout => config.ranking.timeout_secs.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validate `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let key = *self;
        match key {
            ConfigKey::GeofenceMaxRegions => {
                let max: usize = parse_value(key, value)?;
                if max == 0 {
                    return Err(invalid(key, value, "must be at least 1"));
                }
                config.geofence.max_regions = max;
            }
            ConfigKey::GeofenceDistanceThreshold => {
                config.geofence.distance_threshold_m = parse_meters(key, value)?;
            }
            ConfigKey::GeofenceTimeThreshold => {
                let secs: u64 = parse_value(key, value)?;
                if secs == 0 {
                    return Err(invalid(key, value, "must be at least 1 second"));
                }
                config.geofence.time_threshold_secs = secs;
            }
            ConfigKey::GeofenceDefaultRadius => {
                config.geofence.default_radius_m = parse_meters(key, value)?;
            }
            ConfigKey::GeofenceMaxAccuracy => {
                config.geofence.max_accuracy_m = if is_unset(value) {
                    None
                } else {
                    Some(parse_meters(key, value)?)
                };
            }
            ConfigKey::RankingEndpoint => {
                config.ranking.endpoint = optional_string(value);
            }
            ConfigKey::RankingApiToken => {
                config.ranking.api_token = optional_string(value);
            }
            ConfigKey::RankingTimeout => {
                let secs: u64 = parse_value(key, value)?;
                if secs == 0 {
                    return Err(invalid(key, value, "must be at least 1 second"));
                }
                config.ranking.timeout_secs = secs;
            }
            ConfigKey::LoggingLevel => {
                let level = value.trim().to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(invalid(
                        key,
                        value,
                        format!("expected one of {}", LOG_LEVELS.join(", ")),
                    ));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = optional_string(value).map(PathBuf::from);
            }
        }
        Ok(())
    }
}

fn optional_string(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_names() {
        assert_eq!(
            "geofence.max_regions".parse::<ConfigKey>().unwrap(),
            ConfigKey::GeofenceMaxRegions
        );
        assert_eq!(
            "Ranking.Endpoint".parse::<ConfigKey>().unwrap(),
            ConfigKey::RankingEndpoint
        );
        assert!(matches!(
            "geofence.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_every_key_round_trips_its_default() {
        let defaults = ConfigFile::default();
        for key in ConfigKey::all() {
            let value = key.get(&defaults);
            let mut config = ConfigFile::default();
            key.set(&mut config, &value).unwrap();
            assert_eq!(config, defaults, "key {}", key);
        }
    }

    #[test]
    fn test_set_and_clear_optional() {
        let mut config = ConfigFile::default();
        ConfigKey::RankingEndpoint
            .set(&mut config, " https://example.com ")
            .unwrap();
        assert_eq!(config.ranking.endpoint.as_deref(), Some("https://example.com"));

        ConfigKey::RankingEndpoint.set(&mut config, "").unwrap();
        assert!(config.ranking.endpoint.is_none());
    }

    #[test]
    fn test_sections_are_grouped() {
        let sections: Vec<_> = ConfigKey::all().iter().map(|k| k.section()).collect();
        let mut deduped = sections.clone();
        deduped.dedup();
        assert_eq!(deduped, vec!["geofence", "ranking", "logging"]);
        assert!(ConfigKey::RankingApiToken.is_secret());
    }
}
