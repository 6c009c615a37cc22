//! Demo mode - scripted showcase drive
//!
//! A deterministic 30 second cycle: accelerate to 100 km/h, cruise, then
//! brake back to standstill. Slow channels follow sinusoids of simulation
//! time. No noise is injected so playback is reproducible.

use super::model::{gear_for_speed, IDLE_RPM};
use crate::vehicle::VehicleState;

/// Length of one demo cycle in seconds
pub const DEMO_CYCLE_SECS: f64 = 30.0;
/// Length of each phase in seconds
pub const DEMO_PHASE_SECS: f64 = 10.0;
/// Cruise speed in km/h
pub const DEMO_CRUISE_SPEED_KMH: f64 = 100.0;
/// Cruise RPM
pub const DEMO_CRUISE_RPM: f64 = 3000.0;

/// Phase of the demo cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoPhase {
    /// Linear ramp 0 -> 100 km/h
    Accelerate,
    /// Fixed 100 km/h / 3000 RPM
    Cruise,
    /// Linear ramp 100 -> 0 km/h
    Decelerate,
}

/// Speed and RPM prescribed by the demo script at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoPoint {
    /// Script phase
    pub phase: DemoPhase,
    /// Prescribed speed in km/h
    pub speed_kmh: f64,
    /// Prescribed RPM
    pub rpm: f64,
}

/// Position within the cycle for a simulation time
pub fn cycle_position(sim_time: f64) -> f64 {
    sim_time.rem_euclid(DEMO_CYCLE_SECS)
}

/// The scripted speed/RPM curve
///
/// Exactly periodic: `demo_point(t) == demo_point(t + 30.0)`.
pub fn demo_point(sim_time: f64) -> DemoPoint {
    let cycle = cycle_position(sim_time);

    if cycle < DEMO_PHASE_SECS {
        let progress = cycle / DEMO_PHASE_SECS;
        DemoPoint {
            phase: DemoPhase::Accelerate,
            speed_kmh: progress * DEMO_CRUISE_SPEED_KMH,
            rpm: IDLE_RPM + progress * 5000.0,
        }
    } else if cycle < 2.0 * DEMO_PHASE_SECS {
        DemoPoint {
            phase: DemoPhase::Cruise,
            speed_kmh: DEMO_CRUISE_SPEED_KMH,
            rpm: DEMO_CRUISE_RPM,
        }
    } else {
        let remaining = (DEMO_CYCLE_SECS - cycle) / DEMO_PHASE_SECS;
        DemoPoint {
            phase: DemoPhase::Decelerate,
            speed_kmh: remaining * DEMO_CRUISE_SPEED_KMH,
            rpm: IDLE_RPM + remaining * (DEMO_CRUISE_RPM - IDLE_RPM),
        }
    }
}

/// Full demo readings at a simulation time
///
/// Status flags carry over from the previous state.
pub fn demo_state(prev: &VehicleState, sim_time: f64) -> VehicleState {
    let point = demo_point(sim_time);
    let t = sim_time;

    let mut next = *prev;
    next.speed_kmh = point.speed_kmh;
    next.rpm = point.rpm;
    next.gear = gear_for_speed(point.speed_kmh);
    next.fuel_level = 50.0 + 25.0 * (t * 0.1).sin();
    next.engine_temp_c = 70.0 + 20.0 * (t * 0.05).sin();
    next.oil_pressure = 40.0 + 20.0 * (point.rpm / 8000.0);
    next.battery_voltage = 12.6 + 1.4 * (t * 0.2).sin();
    next.flags.engine_running = true;
    next.flags.ignition_on = true;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(demo_point(0.0).phase, DemoPhase::Accelerate);
        assert_eq!(demo_point(0.0).speed_kmh, 0.0);
        assert_eq!(demo_point(5.0).speed_kmh, 50.0);
        assert_eq!(demo_point(10.0).phase, DemoPhase::Cruise);
        assert_eq!(demo_point(15.0).rpm, DEMO_CRUISE_RPM);
        assert_eq!(demo_point(20.0).phase, DemoPhase::Decelerate);
        assert_eq!(demo_point(20.0).speed_kmh, DEMO_CRUISE_SPEED_KMH);
        assert_eq!(demo_point(25.0).speed_kmh, 50.0);
    }

    #[test]
    fn test_ramp_down_ends_at_idle() {
        let point = demo_point(29.999_999);
        assert!(point.speed_kmh < 0.001);
        assert!((point.rpm - IDLE_RPM).abs() < 0.01);
    }

    #[test]
    fn test_cycle_is_periodic() {
        for i in 0..240 {
            let t = i as f64 * 0.125;
            let a = demo_point(t);
            let b = demo_point(t + DEMO_CYCLE_SECS);
            assert_eq!(a.phase, b.phase, "phase mismatch at t={}", t);
            assert!((a.speed_kmh - b.speed_kmh).abs() < 1e-9, "speed mismatch at t={}", t);
            assert!((a.rpm - b.rpm).abs() < 1e-6, "rpm mismatch at t={}", t);
        }
    }

    #[test]
    fn test_slow_channels_follow_sinusoids() {
        let prev = VehicleState::initial(75.0, 25.0);

        let start = demo_state(&prev, 0.0);
        assert_eq!(start.fuel_level, 50.0);
        assert_eq!(start.engine_temp_c, 70.0);
        assert_eq!(start.battery_voltage, 12.6);

        // sin(0.1 t) peaks at t = 5 pi
        let t = 5.0 * std::f64::consts::PI;
        let peak = demo_state(&prev, t);
        assert!((peak.fuel_level - 75.0).abs() < 1e-9);
        assert!((peak.engine_temp_c - (70.0 + 20.0 * (t * 0.05).sin())).abs() < 1e-9);
        assert!((peak.battery_voltage - (12.6 + 1.4 * (t * 0.2).sin())).abs() < 1e-9);

        // sin(0.05 t) and sin(0.2 t) peak at t = 10 pi and t = 2.5 pi
        let hot = demo_state(&prev, 10.0 * std::f64::consts::PI);
        assert!((hot.engine_temp_c - 90.0).abs() < 1e-9);
        let charged = demo_state(&prev, 2.5 * std::f64::consts::PI);
        assert!((charged.battery_voltage - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_demo_state_keeps_flags() {
        let mut prev = VehicleState::initial(75.0, 25.0);
        prev.flags.parking_brake = true;
        let next = demo_state(&prev, 12.0);
        assert!(next.flags.parking_brake);
        assert_eq!(next.speed_kmh, DEMO_CRUISE_SPEED_KMH);
        assert_eq!(next.gear, 5);
    }
}
