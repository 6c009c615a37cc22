//! Post-processing applied after every mode
//!
//! Clamps each channel into its declared range, recomputes warnings and
//! stamps the state. Small clamps (noise pushing a value past a bound) are
//! expected; a clamp larger than the channel's tolerance marks the state
//! invalid but it is still emitted.

use std::time::Duration;

use crate::config::SafetySettings;
use crate::vehicle::{
    ChannelRange, VehicleState, Warnings, BATTERY_RANGE, FUEL_RANGE, GEAR_REVERSE, GEAR_TOP,
    OIL_PRESSURE_RANGE, RPM_RANGE, SPEED_RANGE, TEMP_RANGE,
};

/// Allowed clamp distance on the speed channel
pub const SPEED_TOLERANCE: f64 = 1.0;
/// Allowed clamp distance on the RPM channel
pub const RPM_TOLERANCE: f64 = 100.0;
/// Allowed clamp distance on the temperature channel
pub const TEMP_TOLERANCE: f64 = 2.0;
/// Allowed clamp distance on the oil pressure channel
pub const OIL_PRESSURE_TOLERANCE: f64 = 4.0;
/// Allowed clamp distance on noise-free channels
pub const EXACT_TOLERANCE: f64 = 1e-6;

/// What clamping did to a state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClampOutcome {
    /// Channels that had to be moved at all
    pub clamped: usize,
    /// Channels moved further than their tolerance (or non-finite)
    pub beyond_tolerance: Vec<&'static str>,
}

impl ClampOutcome {
    /// Whether the state can be reported as valid
    pub fn within_tolerance(&self) -> bool {
        self.beyond_tolerance.is_empty()
    }

    fn apply(&mut self, name: &'static str, value: f64, range: ChannelRange, tolerance: f64) -> f64 {
        if !value.is_finite() {
            self.clamped += 1;
            self.beyond_tolerance.push(name);
            return range.min;
        }

        let clamped = value.clamp(range.min, range.max);
        if clamped != value {
            self.clamped += 1;
            if (clamped - value).abs() > tolerance {
                self.beyond_tolerance.push(name);
            }
        }
        clamped
    }
}

/// Warnings implied by a state's readings
pub fn warnings_for(state: &VehicleState, safety: &SafetySettings) -> Warnings {
    let mut warnings = Warnings::empty();
    if state.fuel_level < safety.low_fuel_threshold {
        warnings |= Warnings::LOW_FUEL;
    }
    if state.engine_temp_c > safety.overheat_threshold_c {
        warnings |= Warnings::OVERHEAT;
    }
    if state.rpm > safety.redline_rpm {
        warnings |= Warnings::REDLINE;
    }
    if state.oil_pressure < safety.min_oil_pressure {
        warnings |= Warnings::LOW_OIL_PRESSURE;
    }
    if state.battery_voltage < safety.min_battery_voltage {
        warnings |= Warnings::LOW_BATTERY;
    }
    warnings
}

/// Clamp every channel of a state into its declared range
pub fn clamp_state(raw: VehicleState) -> (VehicleState, ClampOutcome) {
    let mut outcome = ClampOutcome::default();
    let mut state = raw;

    state.speed_kmh = outcome.apply("speed", raw.speed_kmh, SPEED_RANGE, SPEED_TOLERANCE);
    state.rpm = outcome.apply("rpm", raw.rpm, RPM_RANGE, RPM_TOLERANCE);
    state.fuel_level = outcome.apply("fuel_level", raw.fuel_level, FUEL_RANGE, EXACT_TOLERANCE);
    state.engine_temp_c = outcome.apply("engine_temp", raw.engine_temp_c, TEMP_RANGE, TEMP_TOLERANCE);
    state.oil_pressure = outcome.apply(
        "oil_pressure",
        raw.oil_pressure,
        OIL_PRESSURE_RANGE,
        OIL_PRESSURE_TOLERANCE,
    );
    state.battery_voltage = outcome.apply(
        "battery_voltage",
        raw.battery_voltage,
        BATTERY_RANGE,
        EXACT_TOLERANCE,
    );

    let gear = raw.gear.clamp(GEAR_REVERSE, GEAR_TOP);
    if gear != raw.gear {
        outcome.clamped += 1;
        outcome.beyond_tolerance.push("gear");
    }
    state.gear = gear;

    (state, outcome)
}

/// Clamp, derive warnings, and stamp a freshly produced state
pub fn finalize(
    raw: VehicleState,
    safety: &SafetySettings,
    captured_at: Duration,
    sequence: u64,
) -> (VehicleState, ClampOutcome) {
    let (mut state, outcome) = clamp_state(raw);
    state.warnings = warnings_for(&state, safety);
    state.captured_at = captured_at;
    state.sequence = sequence;
    state.valid = outcome.within_tolerance();
    (state, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::WarningKind;

    fn base() -> VehicleState {
        VehicleState::initial(50.0, 25.0)
    }

    #[test]
    fn test_low_fuel_threshold_is_strict() {
        let safety = SafetySettings::default();
        let mut state = base();

        state.fuel_level = 14.9;
        assert!(warnings_for(&state, &safety).has(WarningKind::LowFuel));

        state.fuel_level = 15.1;
        assert!(!warnings_for(&state, &safety).has(WarningKind::LowFuel));

        state.fuel_level = 15.0;
        assert!(!warnings_for(&state, &safety).has(WarningKind::LowFuel));
    }

    #[test]
    fn test_each_threshold() {
        let safety = SafetySettings::default();
        let mut state = base();
        state.engine_temp_c = 95.1;
        state.rpm = 7501.0;
        state.oil_pressure = 14.9;
        state.battery_voltage = 10.9;

        let warnings = warnings_for(&state, &safety);
        assert!(warnings.has(WarningKind::Overheat));
        assert!(warnings.has(WarningKind::Redline));
        assert!(warnings.has(WarningKind::LowOilPressure));
        assert!(warnings.has(WarningKind::LowBattery));
        assert!(!warnings.has(WarningKind::LowFuel));

        state.engine_temp_c = 95.0;
        state.rpm = 7500.0;
        state.oil_pressure = 15.0;
        state.battery_voltage = 11.0;
        assert_eq!(warnings_for(&state, &safety), Warnings::empty());
    }

    #[test]
    fn test_noise_sized_clamp_stays_valid() {
        let mut raw = base();
        raw.speed_kmh = -0.4;
        raw.oil_pressure = -1.5;

        let (state, outcome) = finalize(raw, &SafetySettings::default(), Duration::ZERO, 1);
        assert_eq!(state.speed_kmh, 0.0);
        assert_eq!(state.oil_pressure, 0.0);
        assert_eq!(outcome.clamped, 2);
        assert!(state.valid);
    }

    #[test]
    fn test_large_clamp_invalidates() {
        let mut raw = base();
        raw.fuel_level = 140.0;

        let (state, outcome) = finalize(raw, &SafetySettings::default(), Duration::ZERO, 1);
        assert_eq!(state.fuel_level, 100.0);
        assert_eq!(outcome.beyond_tolerance, vec!["fuel_level"]);
        assert!(!state.valid);
        assert!(state.within_ranges());
    }

    #[test]
    fn test_non_finite_values_are_replaced() {
        let mut raw = base();
        raw.rpm = f64::NAN;
        raw.engine_temp_c = f64::INFINITY;
        raw.gear = 9;

        let (state, outcome) = finalize(raw, &SafetySettings::default(), Duration::ZERO, 3);
        assert!(state.within_ranges());
        assert_eq!(state.rpm, RPM_RANGE.min);
        assert_eq!(state.gear, GEAR_TOP);
        assert_eq!(outcome.beyond_tolerance.len(), 3);
        assert_eq!(state.sequence, 3);
        assert!(!state.valid);
    }
}
