//! Vehicle data model
//!
//! The value type handed from the simulator to every consumer, the declared
//! range of each channel, and the warning set derived from thresholds.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Inclusive range declared for a telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl ChannelRange {
    /// Create a new range
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check whether a value lies within the range (NaN never does)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Vehicle speed in km/h
pub const SPEED_RANGE: ChannelRange = ChannelRange::new(0.0, 300.0);
/// Engine speed
pub const RPM_RANGE: ChannelRange = ChannelRange::new(0.0, 8000.0);
/// Fuel level in percent
pub const FUEL_RANGE: ChannelRange = ChannelRange::new(0.0, 100.0);
/// Engine temperature in °C
pub const TEMP_RANGE: ChannelRange = ChannelRange::new(-40.0, 120.0);
/// Oil pressure in PSI
pub const OIL_PRESSURE_RANGE: ChannelRange = ChannelRange::new(0.0, 100.0);
/// Battery voltage
pub const BATTERY_RANGE: ChannelRange = ChannelRange::new(8.0, 16.0);

/// Reverse gear
pub const GEAR_REVERSE: i8 = -1;
/// Neutral
pub const GEAR_NEUTRAL: i8 = 0;
/// Highest forward gear
pub const GEAR_TOP: i8 = 6;

/// Driver/vehicle status switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    /// Key in the run position
    pub ignition_on: bool,
    /// Cleared means RPM 0 and a target speed of 0
    pub engine_running: bool,
    /// Parking brake engaged
    pub parking_brake: bool,
    /// Driver seatbelt latched
    pub seatbelt_fastened: bool,
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self {
            ignition_on: true,
            engine_running: true,
            parking_brake: false,
            seatbelt_fastened: true,
        }
    }
}

bitflags! {
    /// Set of active warnings, recomputed from thresholds after every update
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Warnings: u8 {
        /// Fuel below threshold
        const LOW_FUEL = 1 << 0;
        /// Engine temperature above threshold
        const OVERHEAT = 1 << 1;
        /// RPM above redline
        const REDLINE = 1 << 2;
        /// Oil pressure below threshold
        const LOW_OIL_PRESSURE = 1 << 3;
        /// Battery voltage below threshold
        const LOW_BATTERY = 1 << 4;
    }
}

/// A single warning condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Fuel below threshold
    LowFuel,
    /// Engine temperature above threshold
    Overheat,
    /// RPM above redline
    Redline,
    /// Oil pressure below threshold
    LowOilPressure,
    /// Battery voltage below threshold
    LowBattery,
}

impl WarningKind {
    /// Every warning kind, in display order
    pub const ALL: [WarningKind; 5] = [
        WarningKind::LowFuel,
        WarningKind::Overheat,
        WarningKind::Redline,
        WarningKind::LowOilPressure,
        WarningKind::LowBattery,
    ];

    /// The flag representing this kind in a [`Warnings`] set
    pub fn flag(self) -> Warnings {
        match self {
            WarningKind::LowFuel => Warnings::LOW_FUEL,
            WarningKind::Overheat => Warnings::OVERHEAT,
            WarningKind::Redline => Warnings::REDLINE,
            WarningKind::LowOilPressure => Warnings::LOW_OIL_PRESSURE,
            WarningKind::LowBattery => Warnings::LOW_BATTERY,
        }
    }

    /// Short label for display
    pub fn label(self) -> &'static str {
        match self {
            WarningKind::LowFuel => "LOW-FUEL",
            WarningKind::Overheat => "OVERHEAT",
            WarningKind::Redline => "REDLINE",
            WarningKind::LowOilPressure => "OIL-PRESSURE",
            WarningKind::LowBattery => "BATTERY",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Warnings {
    /// Iterate over the warning kinds present in this set
    pub fn kinds(self) -> impl Iterator<Item = WarningKind> {
        WarningKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.flag()))
    }

    /// Check whether a specific warning is active
    pub fn has(self, kind: WarningKind) -> bool {
        self.contains(kind.flag())
    }
}

/// One complete set of instrument readings
///
/// Produced once per simulator tick and never mutated afterwards; consumers
/// always receive a full copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Speed in km/h
    pub speed_kmh: f64,
    /// Engine speed
    pub rpm: f64,
    /// Fuel level in percent
    pub fuel_level: f64,
    /// Engine temperature in °C
    pub engine_temp_c: f64,
    /// Oil pressure in PSI
    pub oil_pressure: f64,
    /// Battery voltage
    pub battery_voltage: f64,
    /// -1 = reverse, 0 = neutral, 1..=6 forward
    pub gear: i8,
    /// Driver/vehicle switches
    pub flags: StatusFlags,
    /// Recomputed from thresholds after every update
    pub warnings: Warnings,
    /// Monotonic time since the producing session started
    pub captured_at: Duration,
    /// Publication number; 0 only for the sentinel
    pub sequence: u64,
    /// False for the sentinel and for states clamped beyond tolerance
    pub valid: bool,
}

impl VehicleState {
    /// Placeholder returned before anything has been published
    ///
    /// Every channel is in range so a careless consumer still cannot
    /// render garbage, but `valid` is false and `sequence` is 0.
    pub fn sentinel() -> Self {
        Self {
            speed_kmh: 0.0,
            rpm: 0.0,
            fuel_level: 0.0,
            engine_temp_c: 0.0,
            oil_pressure: 0.0,
            battery_voltage: 12.0,
            gear: GEAR_NEUTRAL,
            flags: StatusFlags {
                ignition_on: false,
                engine_running: false,
                parking_brake: false,
                seatbelt_fastened: false,
            },
            warnings: Warnings::empty(),
            captured_at: Duration::ZERO,
            sequence: 0,
            valid: false,
        }
    }

    /// State of a parked vehicle with the engine idling
    pub fn initial(fuel_level: f64, ambient_temp_c: f64) -> Self {
        Self {
            speed_kmh: 0.0,
            rpm: 800.0,
            fuel_level,
            engine_temp_c: ambient_temp_c,
            oil_pressure: 45.0,
            battery_voltage: 12.6,
            gear: GEAR_NEUTRAL,
            flags: StatusFlags::default(),
            warnings: Warnings::empty(),
            captured_at: Duration::ZERO,
            sequence: 0,
            valid: true,
        }
    }

    /// Whether this is the never-published placeholder
    pub fn is_sentinel(&self) -> bool {
        self.sequence == 0 && !self.valid
    }

    /// Check that every channel lies within its declared range
    pub fn within_ranges(&self) -> bool {
        SPEED_RANGE.contains(self.speed_kmh)
            && RPM_RANGE.contains(self.rpm)
            && FUEL_RANGE.contains(self.fuel_level)
            && TEMP_RANGE.contains(self.engine_temp_c)
            && OIL_PRESSURE_RANGE.contains(self.oil_pressure)
            && BATTERY_RANGE.contains(self.battery_voltage)
            && (GEAR_REVERSE..=GEAR_TOP).contains(&self.gear)
    }

    /// Display label for the gear (R, N, 1..6)
    pub fn gear_label(&self) -> String {
        match self.gear {
            GEAR_REVERSE => "R".to_string(),
            GEAR_NEUTRAL => "N".to_string(),
            g => g.to_string(),
        }
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::sentinel()
    }
}
