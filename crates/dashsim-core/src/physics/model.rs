//! Pure step functions of the vehicle model
//!
//! Each function maps inputs to a single channel value with no hidden state.

use crate::vehicle::{RPM_RANGE, SPEED_RANGE};

/// Strongest braking command (m/s²)
pub const DECEL_LIMIT: f64 = -4.0;
/// Strongest acceleration command (m/s²)
pub const ACCEL_LIMIT: f64 = 2.5;
/// Proportional gain from speed error to acceleration command
pub const ACCEL_GAIN: f64 = 0.5;
/// Speed error below which the vehicle coasts at constant speed
pub const SPEED_DEADBAND_KMH: f64 = 1.0;
/// Upper speed of the realistic driving model
pub const REALISTIC_MAX_SPEED_KMH: f64 = 200.0;

/// Idle speed and RPM floor for a running engine
pub const IDLE_RPM: f64 = 800.0;
/// Gear ratios for gears 1..=6
pub const GEAR_RATIOS: [f64; 6] = [3.5, 2.1, 1.4, 1.0, 0.8, 0.65];
/// Final drive ratio
pub const FINAL_DRIVE: f64 = 3.9;
/// Wheel circumference in meters
pub const WHEEL_CIRCUMFERENCE_M: f64 = 2.0;
/// Speed span covered by each gear
pub const KMH_PER_GEAR: f64 = 25.0;

/// Base fuel consumption rate
pub const FUEL_BASE_RATE: f64 = 0.05;
/// Engine temperature relaxation rate (1/s)
pub const TEMP_RELAX_RATE: f64 = 10.0;

/// Acceleration command towards a target speed
///
/// Braking is allowed to be stronger than accelerating.
pub fn acceleration_command(target_kmh: f64, current_kmh: f64) -> f64 {
    let error = target_kmh - current_kmh;
    if error.abs() > SPEED_DEADBAND_KMH {
        (error * ACCEL_GAIN).clamp(DECEL_LIMIT, ACCEL_LIMIT)
    } else {
        0.0
    }
}

/// Integrate an acceleration (m/s²) over `dt` seconds into a speed in km/h
pub fn speed_step(speed_kmh: f64, accel: f64, dt: f64) -> f64 {
    (speed_kmh + accel * dt * 3.6).clamp(SPEED_RANGE.min, SPEED_RANGE.max)
}

/// Gear selected for a speed
///
/// A step function of speed only: no hysteresis, so it never decreases as
/// speed increases.
pub fn gear_for_speed(speed_kmh: f64) -> i8 {
    if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return 1;
    }
    let step = (speed_kmh / KMH_PER_GEAR).floor().min(5.0);
    (step as i8 + 1).clamp(1, 6)
}

/// Engine RPM for a road speed in a forward gear
pub fn rpm_for(speed_kmh: f64, gear: i8) -> f64 {
    if gear <= 0 {
        return IDLE_RPM;
    }
    let ratio = GEAR_RATIOS[(gear.clamp(1, 6) - 1) as usize];
    let wheel_rpm = (speed_kmh / 3.6) * 60.0 / WHEEL_CIRCUMFERENCE_M;
    (wheel_rpm * FINAL_DRIVE * ratio).clamp(IDLE_RPM, RPM_RANGE.max)
}

/// Fuel used over `dt` seconds, in percent of the tank
pub fn fuel_consumed(speed_kmh: f64, rpm: f64, dt: f64) -> f64 {
    let speed_factor = 1.0 + (speed_kmh / 100.0) * 0.5;
    let rpm_factor = 1.0 + (rpm / RPM_RANGE.max) * 0.3;
    let per_hour = FUEL_BASE_RATE * speed_factor * rpm_factor;
    (per_hour * dt / 3600.0) * 0.1
}

/// Temperature the engine settles at for a given RPM
pub fn engine_temp_target(rpm: f64, ambient_c: f64) -> f64 {
    ambient_c + 50.0 + (rpm / RPM_RANGE.max) * 40.0
}

/// Relax the engine temperature towards its target
///
/// The relaxation factor is capped at 1 so a long step lands on the target
/// instead of overshooting it.
pub fn engine_temp_step(temp_c: f64, rpm: f64, ambient_c: f64, dt: f64) -> f64 {
    let target = engine_temp_target(rpm, ambient_c);
    let factor = (TEMP_RELAX_RATE * dt).min(1.0);
    temp_c + (target - temp_c) * factor
}

/// Oil pressure in PSI
pub fn oil_pressure(rpm: f64, engine_running: bool) -> f64 {
    if engine_running {
        20.0 + (rpm / RPM_RANGE.max) * 60.0
    } else {
        0.0
    }
}

/// Battery voltage, charging while the engine runs
pub fn battery_voltage(engine_running: bool, engine_temp_c: f64) -> f64 {
    let mut voltage = 12.0 + if engine_running { 2.4 } else { 0.6 };
    if engine_temp_c > 100.0 {
        voltage -= 0.2;
    }
    voltage
}
