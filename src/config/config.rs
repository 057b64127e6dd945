use crate::error::ConfigError;
use crate::roster::FleetPolicy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted positional jitter per axis, in degrees
pub const MAX_JITTER_RADIUS: f64 = 1.0;

/// Top-level configuration
///
/// Every value has a default, so an empty file (or no file at all) yields a
/// working configuration. The probabilities and intervals are simulation
/// tuning, not requirements; they are exposed here so drills can be sped up or
/// made more eventful.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
    pub devices: DevicesConfig,
}

/// Status simulator and refresh cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Chance per tick that a person with a locator moves
    pub jitter_probability: f64,
    /// Chance per tick, for a person who moved, that a new status is drawn
    pub status_change_probability: f64,
    /// Maximum positional jitter per axis, in degrees
    pub jitter_radius: f64,
    /// Milliseconds between refresh cycles
    pub refresh_interval_ms: u64,
    /// Fixed seed for reproducible drills; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            jitter_probability: 0.3,
            status_change_probability: 0.02,
            jitter_radius: 0.00005,
            refresh_interval_ms: 5000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// SOS alert retention and notification throttling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    /// Alerts kept in the list, newest first
    pub max_retained: usize,
    /// Audible notifications allowed per minute
    pub notifications_per_minute: usize,
    /// Ring the terminal bell on new alerts
    pub terminal_bell: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            max_retained: 50,
            notifications_per_minute: 6,
            terminal_bell: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub persist_interval_seconds: u64,
    pub max_events: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("calamity-data"),
            persist_interval_seconds: 60,
            max_events: 1000,
        }
    }
}

impl StorageConfig {
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_seconds)
    }
}

/// Device fleet simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DevicesConfig {
    pub interval_seconds: u64,
    pub battery_drain_probability: f64,
    pub status_toggle_probability: f64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        let policy = FleetPolicy::default();
        Self {
            interval_seconds: 30,
            battery_drain_probability: policy.battery_drain_probability,
            status_toggle_probability: policy.status_toggle_probability,
        }
    }
}

impl DevicesConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn policy(&self) -> FleetPolicy {
        FleetPolicy {
            battery_drain_probability: self.battery_drain_probability,
            status_toggle_probability: self.status_toggle_probability,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document and validate it
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TomlError` for malformed TOML and
    /// `ConfigError::ValidationError` for out-of-range values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read, otherwise
    /// the errors of [`Config::from_toml_str`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from an optional path, falling back to defaults
    ///
    /// A missing or unreadable file and an invalid file both yield the
    /// default configuration, with a warning in the log.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("Using default configuration");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::from_file(path) {
            Ok(config) => config,
            Err(ConfigError::ReadError(e)) => {
                warn!("Configuration file not found or unreadable ({}), using defaults", e);
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Configuration error in '{}': {}; using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Check that every value is in range
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability(
            "simulation.jitter_probability",
            self.simulation.jitter_probability,
        )?;
        check_probability(
            "simulation.status_change_probability",
            self.simulation.status_change_probability,
        )?;
        check_probability(
            "devices.battery_drain_probability",
            self.devices.battery_drain_probability,
        )?;
        check_probability(
            "devices.status_toggle_probability",
            self.devices.status_toggle_probability,
        )?;

        let radius = self.simulation.jitter_radius;
        if !(0.0..=MAX_JITTER_RADIUS).contains(&radius) {
            return Err(ConfigError::ValidationError(format!(
                "simulation.jitter_radius must be between 0 and {} degrees, got {}",
                MAX_JITTER_RADIUS, radius
            )));
        }

        let positive = [
            (
                "simulation.refresh_interval_ms",
                self.simulation.refresh_interval_ms as usize,
            ),
            ("alerts.max_retained", self.alerts.max_retained),
            (
                "alerts.notifications_per_minute",
                self.alerts.notifications_per_minute,
            ),
            (
                "storage.persist_interval_seconds",
                self.storage.persist_interval_seconds as usize,
            ),
            ("storage.max_events", self.storage.max_events),
            ("devices.interval_seconds", self.devices.interval_seconds as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn check_probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )))
    }
}
