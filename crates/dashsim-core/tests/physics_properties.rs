//! Property tests for the physics/state model
//!
//! Inputs are generated from seeded generators so failures reproduce.

use dashsim_core::config::{PhysicsConstants, SafetySettings};
use dashsim_core::physics::demo::DEMO_CYCLE_SECS;
use dashsim_core::physics::{
    demo_state, finalize, gear_for_speed, ControlInput, DriveModel, SimulationMode,
};
use dashsim_core::simulator::SimulatorSession;
use dashsim_core::vehicle::VehicleState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

fn assert_finite(state: &VehicleState) {
    for (name, value) in [
        ("speed", state.speed_kmh),
        ("rpm", state.rpm),
        ("fuel", state.fuel_level),
        ("temp", state.engine_temp_c),
        ("oil", state.oil_pressure),
        ("battery", state.battery_voltage),
    ] {
        assert!(value.is_finite(), "{name} is not finite: {value}");
    }
}

fn random_dt(rng: &mut StdRng) -> f64 {
    match rng.gen_range(0..10) {
        0 => f64::NAN,
        1 => -rng.gen_range(0.0..100.0),
        2 => 0.0,
        3 => rng.gen_range(1_000.0..1.0e6),
        4 => f64::INFINITY,
        _ => rng.gen_range(0.0..10.0),
    }
}

fn garbage_state(rng: &mut StdRng) -> VehicleState {
    let mut state = VehicleState::initial(50.0, 25.0);
    state.speed_kmh = rng.gen_range(-1.0e4..1.0e4);
    state.rpm = if rng.gen_bool(0.1) {
        f64::NAN
    } else {
        rng.gen_range(-1.0e5..1.0e5)
    };
    state.fuel_level = rng.gen_range(-500.0..500.0);
    state.engine_temp_c = rng.gen_range(-1.0e3..1.0e3);
    state.oil_pressure = rng.gen_range(-1.0e3..1.0e3);
    state.battery_voltage = rng.gen_range(-100.0..100.0);
    state.gear = rng.gen_range(-20..20);
    state.flags.engine_running = rng.gen_bool(0.8);
    state
}

#[test]
fn test_every_published_state_is_in_range() {
    let safety = SafetySettings::default();
    let mut rng = StdRng::seed_from_u64(0xD45_5EED);

    for mode in SimulationMode::ALL {
        let mut model = DriveModel::new(PhysicsConstants::default(), Some(rng.gen()));
        let mut state = VehicleState::initial(75.0, 25.0);

        for sequence in 1..=2_000u64 {
            let dt = random_dt(&mut rng);
            let control = ControlInput {
                target_speed_kmh: rng.gen_bool(0.2).then(|| rng.gen_range(-100.0..500.0)),
                manual_state: rng.gen_bool(0.5).then(|| garbage_state(&mut rng)),
            };

            let raw = model.advance(&state, dt, mode, &control);
            let (next, _) = finalize(raw, &safety, Duration::from_millis(sequence), sequence);

            assert!(
                next.within_ranges(),
                "{mode} produced an out-of-range state at tick {sequence}: {next:?}"
            );
            assert_finite(&next);
            state = next;
        }
    }
}

#[test]
fn test_gear_is_monotonic_in_speed() {
    let mut previous = gear_for_speed(0.0);
    for i in 0..=30_000 {
        let gear = gear_for_speed(i as f64 * 0.01);
        assert!(gear >= previous, "gear dropped at {} km/h", i as f64 * 0.01);
        assert!((1..=6).contains(&gear));
        previous = gear;
    }
}

#[test]
fn test_gear_never_drops_while_accelerating() {
    let mut model = DriveModel::new(PhysicsConstants::default(), Some(7));
    let control = ControlInput {
        target_speed_kmh: Some(140.0),
        manual_state: None,
    };
    let mut state = VehicleState::initial(75.0, 25.0);
    let mut last_gear = 1;

    // Each 0.5 s step adds 4.5 km/h, far more than the speed jitter.
    while state.speed_kmh < 120.0 {
        let raw = model.advance(&state, 0.5, SimulationMode::Realistic, &control);
        let (next, _) = finalize(raw, &SafetySettings::default(), Duration::ZERO, 1);
        assert!(next.gear >= last_gear, "gear dropped from {last_gear} to {}", next.gear);
        last_gear = next.gear;
        state = next;
    }
    assert!(last_gear >= 5);
}

#[test]
fn test_demo_cycle_repeats_every_thirty_seconds() {
    let prev = VehicleState::initial(75.0, 25.0);
    // Eighths of a second are exact in binary, so phase boundaries line up
    for i in 0..240 {
        let t = i as f64 * 0.125;
        let a = demo_state(&prev, t);
        let b = demo_state(&prev, t + DEMO_CYCLE_SECS);
        assert!((a.speed_kmh - b.speed_kmh).abs() < 1e-6, "speed differs at t={t}");
        assert!((a.rpm - b.rpm).abs() < 1e-6, "rpm differs at t={t}");
        assert_eq!(a.gear, b.gear, "gear differs at t={t}");
    }
}

#[test]
fn test_fuel_drains_over_one_simulated_hour() {
    let mut session = SimulatorSession::with_parts(
        SimulationMode::Realistic,
        PhysicsConstants::default(),
        SafetySettings::default(),
        Some(2024),
        75.0,
    );
    let dt = 0.1;
    let mut last_fuel = 75.0;

    for i in 1..=36_000u64 {
        let state = session.tick_at(dt, Duration::from_millis(i * 100));
        assert!(state.fuel_level <= last_fuel, "fuel rose at tick {i}");
        assert!(state.fuel_level >= 0.0);
        last_fuel = state.fuel_level;
    }

    assert!(last_fuel < 75.0);
    assert_eq!(session.error_count(), 0);
    assert_eq!(session.tick_count(), 36_000);
}
