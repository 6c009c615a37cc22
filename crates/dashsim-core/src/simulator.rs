//! Telemetry Simulator
//!
//! Owns the simulator session: the active mode, the current and previous
//! vehicle state, the driving model and running statistics. A session is
//! mutated only by the simulator loop; everything else sees its output
//! through the telemetry store or a [`SimulatorStats`] copy.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{PhysicsConstants, SafetySettings, Settings};
use crate::monitor::Ewma;
use crate::physics::{finalize, ControlInput, DriveModel, SimulationMode};
use crate::vehicle::VehicleState;

/// Smoothing factor for the update-time average
const UPDATE_TIME_ALPHA: f64 = 0.1;

/// Requests applied by the simulator loop between ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulatorCommand {
    /// Switch the state-advance function
    SetMode(SimulationMode),
    /// Replace the state emitted in manual mode
    Inject(VehicleState),
    /// Override (or release) the realistic target speed
    SetTargetSpeed(Option<f64>),
}

/// Consistent copy of a session's statistics
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStats {
    /// Session identifier
    pub session_id: Uuid,
    /// Active mode
    pub mode: SimulationMode,
    /// States produced
    pub tick_count: u64,
    /// States that had to be clamped beyond tolerance
    pub error_count: u64,
    /// Exponentially smoothed duration of one update
    pub avg_update_ms: f64,
    /// Simulated seconds elapsed
    pub sim_time_secs: f64,
    /// Longitudinal acceleration between the last two states
    pub acceleration_mps2: f64,
    /// Latest state
    pub current: VehicleState,
    /// State before the latest
    pub previous: VehicleState,
}

/// The simulator's exclusively owned working state
pub struct SimulatorSession {
    id: Uuid,
    mode: SimulationMode,
    current: VehicleState,
    previous: VehicleState,
    model: DriveModel,
    safety: SafetySettings,
    control: ControlInput,
    epoch: Instant,
    last_dt: f64,
    tick_count: u64,
    error_count: u64,
    avg_update_ms: Ewma,
}

impl SimulatorSession {
    /// Create a session from validated settings
    pub fn new(settings: &Settings) -> Self {
        Self::with_parts(
            settings.simulation.mode,
            settings.physics,
            settings.safety,
            settings.simulation.seed,
            settings.simulation.initial_fuel_level,
        )
    }

    /// Create a session from individual parts
    pub fn with_parts(
        mode: SimulationMode,
        physics: PhysicsConstants,
        safety: SafetySettings,
        seed: Option<u64>,
        initial_fuel_level: f64,
    ) -> Self {
        let initial = VehicleState::initial(initial_fuel_level, physics.ambient_temp_c);
        let id = Uuid::new_v4();

        tracing::info!(
            session = %id,
            %mode,
            mass_kg = physics.vehicle_mass_kg,
            drag = physics.drag_coefficient,
            power_kw = physics.engine_power_kw,
            ambient_c = physics.ambient_temp_c,
            seeded = seed.is_some(),
            "Simulator session created"
        );

        Self {
            id,
            mode,
            current: initial,
            previous: initial,
            model: DriveModel::new(physics, seed),
            safety,
            control: ControlInput::default(),
            epoch: Instant::now(),
            last_dt: 0.0,
            tick_count: 0,
            error_count: 0,
            avg_update_ms: Ewma::new(UPDATE_TIME_ALPHA),
        }
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Active mode
    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Most recently produced state
    pub fn current(&self) -> &VehicleState {
        &self.current
    }

    /// State produced by the tick before the current one
    pub fn previous(&self) -> &VehicleState {
        &self.previous
    }

    /// Physical constants, fixed for the session's lifetime
    pub fn physics(&self) -> &PhysicsConstants {
        self.model.constants()
    }

    /// Number of completed ticks
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Number of states clamped beyond tolerance
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Switch mode; the next tick uses it
    pub fn set_mode(&mut self, mode: SimulationMode) {
        if mode == self.mode {
            return;
        }
        if mode == SimulationMode::Replay {
            tracing::warn!("Replay mode has no recording source; running the realistic model");
        }
        tracing::info!(from = %self.mode, to = %mode, "Simulation mode changed");
        self.mode = mode;
    }

    /// Apply a command received from outside the simulator loop
    pub fn apply(&mut self, command: SimulatorCommand) {
        match command {
            SimulatorCommand::SetMode(mode) => self.set_mode(mode),
            SimulatorCommand::Inject(state) => self.control.manual_state = Some(state),
            SimulatorCommand::SetTargetSpeed(target) => self.control.target_speed_kmh = target,
        }
    }

    /// Advance one tick, stamping the state with the session clock
    pub fn tick(&mut self, dt: f64) -> VehicleState {
        let now = self.epoch.elapsed();
        self.tick_at(dt, now)
    }

    /// Advance one tick with an explicit monotonic timestamp
    ///
    /// The timestamp is never allowed to go backwards relative to the
    /// previous state.
    pub fn tick_at(&mut self, dt: f64, now: Duration) -> VehicleState {
        self.previous = self.current;

        let raw = self
            .model
            .advance(&self.previous, dt, self.mode, &self.control);
        let captured_at = now.max(self.previous.captured_at);
        let sequence = self.tick_count + 1;

        let (state, outcome) = finalize(raw, &self.safety, captured_at, sequence);
        if !outcome.within_tolerance() {
            self.error_count += 1;
            tracing::warn!(
                sequence,
                channels = ?outcome.beyond_tolerance,
                "Vehicle state clamped beyond tolerance"
            );
        }

        self.current = state;
        self.tick_count = sequence;
        self.last_dt = dt;
        state
    }

    /// Fold one measured update duration into the smoothed average
    pub fn record_update_time(&mut self, elapsed: Duration) {
        self.avg_update_ms.update(elapsed.as_secs_f64() * 1000.0);
    }

    /// Longitudinal acceleration between the previous and current state
    pub fn acceleration_mps2(&self) -> f64 {
        if self.last_dt > 0.0 && self.last_dt.is_finite() {
            (self.current.speed_kmh - self.previous.speed_kmh) / 3.6 / self.last_dt
        } else {
            0.0
        }
    }

    /// Copy of the current statistics
    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            session_id: self.id,
            mode: self.mode,
            tick_count: self.tick_count,
            error_count: self.error_count,
            avg_update_ms: self.avg_update_ms.value(),
            sim_time_secs: self.model.sim_time(),
            acceleration_mps2: self.acceleration_mps2(),
            current: self.current,
            previous: self.previous,
        }
    }

    /// Final statistics dump
    pub fn log_summary(&self) {
        let stats = self.stats();
        tracing::info!(
            session = %stats.session_id,
            mode = %stats.mode,
            ticks = stats.tick_count,
            errors = stats.error_count,
            avg_update_ms = stats.avg_update_ms,
            speed_kmh = stats.current.speed_kmh,
            rpm = stats.current.rpm,
            fuel = stats.current.fuel_level,
            engine_temp_c = stats.current.engine_temp_c,
            "Simulator session statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mode: SimulationMode) -> SimulatorSession {
        SimulatorSession::with_parts(
            mode,
            PhysicsConstants::default(),
            SafetySettings::default(),
            Some(11),
            75.0,
        )
    }

    #[test]
    fn test_tick_numbers_and_previous() {
        let mut s = session(SimulationMode::Realistic);
        let first = s.tick_at(0.01, Duration::from_millis(10));
        let second = s.tick_at(0.01, Duration::from_millis(20));

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(s.tick_count(), 2);
        assert_eq!(*s.previous(), first);
        assert_eq!(*s.current(), second);
    }

    #[test]
    fn test_captured_at_never_goes_backwards() {
        let mut s = session(SimulationMode::Demo);
        let a = s.tick_at(0.01, Duration::from_millis(50));
        let b = s.tick_at(0.01, Duration::from_millis(20));
        assert_eq!(b.captured_at, a.captured_at);
    }

    #[test]
    fn test_mode_switch_applies_on_next_tick() {
        let mut s = session(SimulationMode::Realistic);
        s.tick_at(0.01, Duration::ZERO);

        let mut injected = VehicleState::initial(40.0, 25.0);
        injected.speed_kmh = 123.0;
        s.apply(SimulatorCommand::Inject(injected));
        s.apply(SimulatorCommand::SetMode(SimulationMode::Manual));
        assert_eq!(s.mode(), SimulationMode::Manual);

        let state = s.tick_at(0.01, Duration::from_millis(10));
        assert_eq!(state.speed_kmh, 123.0);
        assert_eq!(state.fuel_level, 40.0);
        assert_eq!(state.sequence, 2);
        assert!(state.valid);
    }

    #[test]
    fn test_out_of_range_injection_counts_error() {
        let mut s = session(SimulationMode::Manual);
        let mut injected = VehicleState::initial(75.0, 25.0);
        injected.battery_voltage = 30.0;
        s.apply(SimulatorCommand::Inject(injected));

        let state = s.tick_at(0.01, Duration::ZERO);
        assert_eq!(state.battery_voltage, 16.0);
        assert!(!state.valid);
        assert_eq!(s.error_count(), 1);
    }

    #[test]
    fn test_update_time_smoothing() {
        let mut s = session(SimulationMode::Demo);
        s.record_update_time(Duration::from_millis(10));
        assert!((s.stats().avg_update_ms - 10.0).abs() < 1e-9);

        s.record_update_time(Duration::from_millis(20));
        assert!((s.stats().avg_update_ms - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_acceleration_from_previous_state() {
        let mut s = session(SimulationMode::Demo);
        s.tick_at(1.0, Duration::from_secs(1));
        s.tick_at(1.0, Duration::from_secs(2));
        // Demo ramp: 10 km/h per second
        let accel = s.acceleration_mps2();
        assert!((accel - 10.0 / 3.6).abs() < 1e-9);
    }
}
