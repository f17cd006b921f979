//! Application configuration.

use crate::sensors::counters::CounterConfig;
use crate::sensors::types::SensorConfig;
use crate::workouts::engine::GradientCurve;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// BLE link settings
    pub sensors: SensorSettings,
    /// Telemetry conditioning settings
    pub conditioning: ConditioningSettings,
    /// Workout settings
    pub workout: WorkoutSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sensors: SensorSettings::default(),
            conditioning: ConditioningSettings::default(),
            workout: WorkoutSettings::default(),
        }
    }
}

impl AppConfig {
    /// Counter differencer settings derived from this config.
    pub fn counter_config(&self) -> CounterConfig {
        CounterConfig {
            wheel_circumference_m: self.sensors.wheel_circumference_m,
            wheel_window_min_s: self.conditioning.wheel_window_min_s,
            wheel_window_max_s: self.conditioning.wheel_window_max_s,
        }
    }
}

/// Sensor-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Discovery timeout in seconds
    pub discovery_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Also accept peripherals whose name contains this
    pub name_filter: Option<String>,
    /// Wheel circumference used for revolution counters, in meters
    pub wheel_circumference_m: f64,
    /// Wheel circumference written to the trainer at setup, in millimeters
    pub peripheral_wheel_circumference_mm: u16,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 10,
            connection_timeout_secs: 10,
            name_filter: None,
            wheel_circumference_m: 2.105,
            peripheral_wheel_circumference_mm: 2100,
        }
    }
}

impl SensorSettings {
    pub fn to_sensor_config(&self) -> SensorConfig {
        SensorConfig {
            discovery_timeout_secs: self.discovery_timeout_secs,
            connection_timeout_secs: self.connection_timeout_secs,
            name_filter: self.name_filter.clone(),
        }
    }

    /// Setup circumference in the control point's 0.1 mm units.
    pub fn peripheral_circumference_tenth_mm(&self) -> u16 {
        self.peripheral_wheel_circumference_mm.saturating_mul(10)
    }
}

/// Telemetry conditioning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningSettings {
    /// Power smoothing factor
    pub power_smoothing_alpha: f32,
    /// Estimate speed from power when the trainer reports none
    pub estimate_speed_from_power: bool,
    /// Shortest accepted wheel event window in seconds
    pub wheel_window_min_s: f64,
    /// Longest accepted wheel event window in seconds
    pub wheel_window_max_s: f64,
}

impl Default for ConditioningSettings {
    fn default() -> Self {
        Self {
            power_smoothing_alpha: crate::metrics::smoothing::DEFAULT_POWER_ALPHA,
            estimate_speed_from_power: true,
            wheel_window_min_s: 0.1,
            wheel_window_max_s: 5.0,
        }
    }
}

/// Workout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutSettings {
    /// Gradient to resistance curve for track workouts
    pub gradient_curve: GradientCurve,
    /// Average speed assumed when estimating track duration
    pub gpx_average_speed_kmh: f64,
}

impl Default for WorkoutSettings {
    fn default() -> Self {
        Self {
            gradient_curve: GradientCurve::Progressive,
            gpx_average_speed_kmh: 20.0,
        }
    }
}

/// Get the application config directory.
pub fn get_config_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "ridelink", "RideLink")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to `path`, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
