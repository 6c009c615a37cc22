//! Loading settings from files on disk

use dashsim_core::config::{ConfigError, Settings};
use dashsim_core::physics::SimulationMode;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp file");
    file
}

#[test]
fn test_load_full_settings_file() {
    let file = write_temp(
        r#"{
            "performance": { "data_rate_hz": 50, "consumer_rate_hz": 30, "monitor_rate_hz": 5 },
            "physics": { "vehicle_mass_kg": 1200.0, "ambient_temp_c": -10.0 },
            "simulation": { "mode": "demo", "seed": 1234, "initial_fuel_level": 40.0 },
            "safety": { "low_fuel_threshold": 20.0, "redline_rpm": 6500.0 }
        }"#,
    );

    let settings = Settings::load(file.path()).unwrap();
    assert_eq!(settings.performance.data_rate_hz, 50);
    assert_eq!(settings.performance.monitor_rate_hz, 5);
    assert_eq!(settings.physics.vehicle_mass_kg, 1200.0);
    assert_eq!(settings.physics.drag_coefficient, 0.35);
    assert_eq!(settings.simulation.mode, SimulationMode::Demo);
    assert_eq!(settings.simulation.seed, Some(1234));
    assert_eq!(settings.safety.low_fuel_threshold, 20.0);
    assert_eq!(settings.safety.overheat_threshold_c, 95.0);
}

#[test]
fn test_empty_object_gives_defaults() {
    let file = write_temp("{}");
    assert_eq!(Settings::load(file.path()).unwrap(), Settings::default());
}

#[test]
fn test_default_settings_survive_a_file_round_trip() {
    let json = Settings::default().to_json_pretty().unwrap();
    let file = write_temp(&json);
    assert_eq!(Settings::load(file.path()).unwrap(), Settings::default());
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");

    match Settings::load(&path) {
        Err(ConfigError::Io { path: reported, .. }) => {
            assert!(reported.ends_with("missing.json"))
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let file = write_temp(r#"{ "performance": { "data_rate_hz": "fast" } }"#);
    assert!(matches!(
        Settings::load(file.path()),
        Err(ConfigError::Parse(_))
    ));

    let file = write_temp(r#"{ "simulation": { "mode": "warp" } }"#);
    assert!(matches!(
        Settings::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_out_of_range_file_is_rejected() {
    let file = write_temp(r#"{ "performance": { "data_rate_hz": 5000 } }"#);
    match Settings::load(file.path()) {
        Err(ConfigError::InvalidValue { field, message }) => {
            assert_eq!(field, "performance.data_rate_hz");
            assert!(message.contains("5000"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}
