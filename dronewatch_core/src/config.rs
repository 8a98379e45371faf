//! Runtime configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file
//! (or none at all) is valid. Command-line flags are applied on top by the
//! binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::proximity::DEFAULT_THRESHOLD_M;

/// Default number of drones kept in the active window
pub const DEFAULT_WINDOW_CAPACITY: usize = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration for a DroneWatch processing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Maximum drones tracked at once (default: 2000)
    #[serde(alias = "windowCapacity", alias = "density")]
    pub window_capacity: usize,

    /// Pairs strictly closer than this raise an alert (default: 100 m)
    #[serde(alias = "proximityThresholdMeters", alias = "proximity_threshold_meters")]
    pub proximity_threshold_m: f64,

    /// How long a source poll waits before reporting idle (default: 1 s)
    #[serde(alias = "pollTimeoutSeconds", alias = "timeout")]
    pub poll_timeout_secs: f64,

    /// Persistent store layout
    pub store: StoreConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            proximity_threshold_m: DEFAULT_THRESHOLD_M,
            poll_timeout_secs: 1.0,
            store: StoreConfig::default(),
        }
    }
}

impl WatchConfig {
    /// Reads and validates a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_capacity",
                reason: "must be a positive integer".to_string(),
            });
        }
        if !self.proximity_threshold_m.is_finite() || self.proximity_threshold_m < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "proximity_threshold_m",
                reason: format!("must be finite and >= 0, got {}", self.proximity_threshold_m),
            });
        }
        if !self.poll_timeout_secs.is_finite() || self.poll_timeout_secs <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_timeout_secs",
                reason: format!("must be finite and > 0, got {}", self.poll_timeout_secs),
            });
        }
        Ok(())
    }

    /// Poll timeout as a `Duration`.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.poll_timeout_secs)
    }
}

/// Where and how records are persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory
    pub path: PathBuf,

    pub raw_table: String,
    pub cart_table: String,
    pub prox_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dronewatch.db"),
            raw_table: "drones_raw".to_string(),
            cart_table: "drones_cart".to_string(),
            prox_table: "drones_proximity".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.window_capacity, 2000);
        assert_eq!(config.proximity_threshold_m, 100.0);
        assert_eq!(config.poll_timeout(), Duration::from_secs(1));
        assert_eq!(config.store.prox_table, "drones_proximity");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(WatchConfig::from_json_str("{}").unwrap(), WatchConfig::default());
    }

    #[test]
    fn test_aliases() {
        let config = WatchConfig::from_json_str(
            r#"{"density": 50, "proximityThresholdMeters": 25.5, "timeout": 0.25,
                "store": {"raw_table": "raw"}}"#,
        )
        .unwrap();

        assert_eq!(config.window_capacity, 50);
        assert_eq!(config.proximity_threshold_m, 25.5);
        assert_eq!(config.poll_timeout(), Duration::from_millis(250));
        assert_eq!(config.store.raw_table, "raw");
        assert_eq!(config.store.cart_table, "drones_cart");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = WatchConfig::from_json_str(r#"{"window_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "window_capacity", .. }));
    }

    #[test]
    fn test_negative_capacity_is_a_parse_error() {
        let err = WatchConfig::from_json_str(r#"{"window_capacity": -3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_threshold_and_timeout_rejected() {
        let mut config = WatchConfig::default();
        config.proximity_threshold_m = -1.0;
        assert!(config.validate().is_err());

        let mut config = WatchConfig::default();
        config.poll_timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = WatchConfig::from_json_file("/nonexistent/dronewatch.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
