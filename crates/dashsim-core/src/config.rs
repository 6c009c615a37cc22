//! Simulator settings
//!
//! Loaded once at startup from a JSON file and treated as immutable for the
//! lifetime of a session. Every section is optional in the file; missing
//! sections and fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::physics::SimulationMode;
use crate::vehicle::{BATTERY_RANGE, FUEL_RANGE, OIL_PRESSURE_RANGE, RPM_RANGE, TEMP_RANGE};

/// Lowest accepted loop rate
pub const MIN_RATE_HZ: u32 = 1;
/// Highest accepted loop rate
pub const MAX_RATE_HZ: u32 = 1000;

/// Errors that can occur while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("I/O error reading '{path}': {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid settings JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its accepted range
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Dotted path of the offending field
        field: String,
        /// Why the value was rejected
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Target rates of the three loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Simulator tick rate
    pub data_rate_hz: u32,
    /// Consumer (renderer) frame rate
    pub consumer_rate_hz: u32,
    /// Monitor sampling rate
    pub monitor_rate_hz: u32,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            data_rate_hz: 100,
            consumer_rate_hz: 60,
            monitor_rate_hz: 10,
        }
    }
}

impl PerformanceSettings {
    /// Nominal simulator tick interval
    pub fn data_interval(&self) -> Duration {
        interval_for(self.data_rate_hz)
    }

    /// Nominal consumer frame interval
    pub fn consumer_interval(&self) -> Duration {
        interval_for(self.consumer_rate_hz)
    }

    /// Nominal monitor sampling interval
    pub fn monitor_interval(&self) -> Duration {
        interval_for(self.monitor_rate_hz)
    }
}

fn interval_for(rate_hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(MIN_RATE_HZ)))
}

/// Physical constants of the simulated vehicle, fixed per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConstants {
    /// Curb mass in kg
    pub vehicle_mass_kg: f64,
    /// Aerodynamic drag coefficient
    pub drag_coefficient: f64,
    /// Rolling resistance coefficient
    pub rolling_resistance: f64,
    /// Peak engine power in kW
    pub engine_power_kw: f64,
    /// Ambient air temperature in °C
    pub ambient_temp_c: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            vehicle_mass_kg: 1500.0,
            drag_coefficient: 0.35,
            rolling_resistance: 0.015,
            engine_power_kw: 150.0,
            ambient_temp_c: 25.0,
        }
    }
}

/// Simulation behaviour at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Mode active on the first tick
    pub mode: SimulationMode,
    /// Seed for the noise/intent generator; entropy when absent
    pub seed: Option<u64>,
    /// Starting fuel level in percent
    pub initial_fuel_level: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Realistic,
            seed: None,
            initial_fuel_level: 75.0,
        }
    }
}

/// Warning thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    /// Fuel below this percentage raises low-fuel
    pub low_fuel_threshold: f64,
    /// Engine temperature above this raises overheat
    pub overheat_threshold_c: f64,
    /// RPM above this raises redline
    pub redline_rpm: f64,
    /// Oil pressure below this raises low-oil-pressure
    pub min_oil_pressure: f64,
    /// Battery voltage below this raises low-battery
    pub min_battery_voltage: f64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            low_fuel_threshold: 15.0,
            overheat_threshold_c: 95.0,
            redline_rpm: 7500.0,
            min_oil_pressure: 15.0,
            min_battery_voltage: 11.0,
        }
    }
}

/// Complete validated settings record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Loop rates
    pub performance: PerformanceSettings,
    /// Vehicle constants
    pub physics: PhysicsConstants,
    /// Initial mode, seed and fuel
    pub simulation: SimulationSettings,
    /// Warning thresholds
    pub safety: SafetySettings,
}

impl Settings {
    /// Read, parse and validate a settings file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate settings from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Pretty-printed JSON, suitable as a starting config file
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let perf = &self.performance;
        for (field, rate) in [
            ("performance.data_rate_hz", perf.data_rate_hz),
            ("performance.consumer_rate_hz", perf.consumer_rate_hz),
            ("performance.monitor_rate_hz", perf.monitor_rate_hz),
        ] {
            if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&rate) {
                return Err(ConfigError::invalid(
                    field,
                    format!("{rate} Hz is outside {MIN_RATE_HZ}..={MAX_RATE_HZ} Hz"),
                ));
            }
        }

        let physics = &self.physics;
        positive("physics.vehicle_mass_kg", physics.vehicle_mass_kg)?;
        positive("physics.engine_power_kw", physics.engine_power_kw)?;
        non_negative("physics.drag_coefficient", physics.drag_coefficient)?;
        non_negative("physics.rolling_resistance", physics.rolling_resistance)?;
        within(
            "physics.ambient_temp_c",
            physics.ambient_temp_c,
            TEMP_RANGE.min,
            60.0,
        )?;

        within(
            "simulation.initial_fuel_level",
            self.simulation.initial_fuel_level,
            FUEL_RANGE.min,
            FUEL_RANGE.max,
        )?;

        let safety = &self.safety;
        within(
            "safety.low_fuel_threshold",
            safety.low_fuel_threshold,
            FUEL_RANGE.min,
            FUEL_RANGE.max,
        )?;
        within(
            "safety.overheat_threshold_c",
            safety.overheat_threshold_c,
            TEMP_RANGE.min,
            TEMP_RANGE.max,
        )?;
        within("safety.redline_rpm", safety.redline_rpm, RPM_RANGE.min, RPM_RANGE.max)?;
        within(
            "safety.min_oil_pressure",
            safety.min_oil_pressure,
            OIL_PRESSURE_RANGE.min,
            OIL_PRESSURE_RANGE.max,
        )?;
        within(
            "safety.min_battery_voltage",
            safety.min_battery_voltage,
            BATTERY_RANGE.min,
            BATTERY_RANGE.max,
        )?;

        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be positive")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must not be negative")))
    }
}

fn within(field: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value} is outside {min}..={max}"),
        ))
    }
}
