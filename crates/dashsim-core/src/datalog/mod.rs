//! Telemetry Logging
//!
//! Keeps a bounded in-memory history of published vehicle states. Nothing
//! is written to disk.

mod recorder;

pub use recorder::{TelemetryLog, TelemetryRecorder, DEFAULT_CAPACITY, DEFAULT_SAMPLE_RATE_HZ};

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::vehicle::{VehicleState, WarningKind};

/// A single log entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogEntry {
    /// Session time the state was captured at
    pub timestamp: Duration,
    /// The recorded state
    pub state: VehicleState,
}

impl LogEntry {
    /// Create an entry from a published state
    pub fn new(state: VehicleState) -> Self {
        Self {
            timestamp: state.captured_at,
            state,
        }
    }

    /// Numeric value of one channel
    pub fn value(&self, channel: Channel) -> f64 {
        let s = &self.state;
        match channel {
            Channel::Speed => s.speed_kmh,
            Channel::Rpm => s.rpm,
            Channel::Fuel => s.fuel_level,
            Channel::EngineTemp => s.engine_temp_c,
            Channel::OilPressure => s.oil_pressure,
            Channel::Battery => s.battery_voltage,
            Channel::Gear => f64::from(s.gear),
        }
    }
}

/// Numeric channels that can be extracted from a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Speed in km/h
    Speed,
    /// Engine speed
    Rpm,
    /// Fuel level in percent
    Fuel,
    /// Engine temperature in °C
    EngineTemp,
    /// Oil pressure in PSI
    OilPressure,
    /// Battery voltage
    Battery,
    /// Selected gear
    Gear,
}

impl Channel {
    /// Every channel
    pub const ALL: [Channel; 7] = [
        Channel::Speed,
        Channel::Rpm,
        Channel::Fuel,
        Channel::EngineTemp,
        Channel::OilPressure,
        Channel::Battery,
        Channel::Gear,
    ];

    /// Channel name with unit
    pub fn name(self) -> &'static str {
        match self {
            Channel::Speed => "speed_kmh",
            Channel::Rpm => "rpm",
            Channel::Fuel => "fuel_pct",
            Channel::EngineTemp => "engine_temp_c",
            Channel::OilPressure => "oil_pressure_psi",
            Channel::Battery => "battery_v",
            Channel::Gear => "gear",
        }
    }
}

/// Aggregate view over the entries of a log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    /// Number of entries
    pub entries: usize,
    /// Time between the first and last entry
    pub duration: Duration,
    /// Highest recorded speed
    pub max_speed_kmh: f64,
    /// Highest recorded RPM
    pub max_rpm: f64,
    /// Fuel level drop from the first to the last entry, never negative
    pub fuel_used: f64,
    /// Number of entries carrying each warning, in [`WarningKind::ALL`] order
    pub warning_counts: Vec<(WarningKind, usize)>,
}

impl LogSummary {
    /// Summarize a sequence of entries
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        let mut count = 0;
        let mut first: Option<&LogEntry> = None;
        let mut last: Option<&LogEntry> = None;
        let mut max_speed_kmh: f64 = 0.0;
        let mut max_rpm: f64 = 0.0;
        let mut warning_counts: Vec<(WarningKind, usize)> =
            WarningKind::ALL.iter().map(|&kind| (kind, 0)).collect();

        for entry in entries {
            count += 1;
            first.get_or_insert(entry);
            last = Some(entry);
            max_speed_kmh = max_speed_kmh.max(entry.state.speed_kmh);
            max_rpm = max_rpm.max(entry.state.rpm);
            for (kind, n) in warning_counts.iter_mut() {
                if entry.state.warnings.has(*kind) {
                    *n += 1;
                }
            }
        }

        let (duration, fuel_used) = match (first, last) {
            (Some(first), Some(last)) => (
                last.timestamp.saturating_sub(first.timestamp),
                (first.state.fuel_level - last.state.fuel_level).max(0.0),
            ),
            _ => (Duration::ZERO, 0.0),
        };

        Self {
            entries: count,
            duration,
            max_speed_kmh,
            max_rpm,
            fuel_used,
            warning_counts,
        }
    }

    /// Entries carrying a given warning
    pub fn warning_count(&self, kind: WarningKind) -> usize {
        self.warning_counts
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries over {:.1}s",
            self.entries,
            self.duration.as_secs_f64()
        )?;
        writeln!(
            f,
            "max speed {:.1} km/h, max rpm {:.0}, fuel used {:.3}%",
            self.max_speed_kmh, self.max_rpm, self.fuel_used
        )?;
        let active: Vec<String> = self
            .warning_counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(kind, n)| format!("{kind} x{n}"))
            .collect();
        if active.is_empty() {
            write!(f, "no warnings")
        } else {
            write!(f, "warnings: {}", active.join(", "))
        }
    }
}
