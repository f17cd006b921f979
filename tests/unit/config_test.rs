//! Unit tests for configuration loading and saving.

use ridelink::sensors::control::ControlCommand;
use ridelink::storage::config::{load_config_from, save_config_to, AppConfig, ConfigError};
use ridelink::workouts::engine::GradientCurve;
use ridelink::HubSettings;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = AppConfig::default();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.sensors.discovery_timeout_secs, 10);
    assert_eq!(config.sensors.wheel_circumference_m, 2.105);
    assert_eq!(config.sensors.peripheral_circumference_tenth_mm(), 21000);
    assert_eq!(config.conditioning.power_smoothing_alpha, 0.85);
    assert!(config.conditioning.estimate_speed_from_power);
    assert_eq!(config.workout.gradient_curve, GradientCurve::Progressive);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config_from(&dir.path().join("config.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AppConfig::default();
    config.sensors.name_filter = Some("KICKR".to_string());
    config.workout.gradient_curve = GradientCurve::Stepped;
    config.conditioning.estimate_speed_from_power = false;

    save_config_to(&config, &path).unwrap();
    assert_eq!(load_config_from(&path).unwrap(), config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
log_level = "debug"

[sensors]
wheel_circumference_m = 2.096

[workout]
gradient_curve = "stepped"
"#,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.sensors.wheel_circumference_m, 2.096);
    assert_eq!(config.sensors.connection_timeout_secs, 10);
    assert_eq!(config.workout.gradient_curve, GradientCurve::Stepped);
    assert_eq!(config.workout.gpx_average_speed_kmh, 20.0);
    assert_eq!(config.counter_config().wheel_circumference_m, 2.096);
}

#[test]
fn test_invalid_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sensors\nname_filter = ").unwrap();

    assert!(matches!(
        load_config_from(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_hub_settings_from_config() {
    let mut config = AppConfig::default();
    config.sensors.peripheral_wheel_circumference_mm = 2096;

    let settings = HubSettings::from_config(&config);
    assert_eq!(
        settings.setup_commands,
        vec![
            ControlCommand::SetWheelCircumference(20960),
            ControlCommand::StartOrResume
        ]
    );
    assert_eq!(settings.counters.wheel_circumference_m, 2.105);
}
