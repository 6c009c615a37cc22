//! Unit Conversion
//!
//! Vehicle state is always kept in km/h, °C and PSI. Front ends convert at
//! display time through a [`UnitSystem`].

use serde::{Deserialize, Serialize};

const MPH_PER_KMH: f64 = 0.621_371_192_237_33;
const PSI_PER_KPA: f64 = 0.145_037_737_730_209_23;
const PSI_PER_BAR: f64 = 14.503_773_773_020_923;

/// Convert km/h to mph
pub fn kmh_to_mph(kmh: f64) -> f64 {
    kmh * MPH_PER_KMH
}

/// Convert mph to km/h
pub fn mph_to_kmh(mph: f64) -> f64 {
    mph / MPH_PER_KMH
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Convert PSI to kPa
pub fn psi_to_kpa(psi: f64) -> f64 {
    psi / PSI_PER_KPA
}

/// Convert PSI to bar
pub fn psi_to_bar(psi: f64) -> f64 {
    psi / PSI_PER_BAR
}

/// Display unit family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// km/h, °C, bar
    #[default]
    Metric,
    /// mph, °F, PSI
    Imperial,
}

impl UnitSystem {
    /// Speed from km/h, with its unit label
    pub fn speed(self, kmh: f64) -> (f64, &'static str) {
        match self {
            UnitSystem::Metric => (kmh, "km/h"),
            UnitSystem::Imperial => (kmh_to_mph(kmh), "mph"),
        }
    }

    /// Temperature from °C, with its unit label
    pub fn temperature(self, celsius: f64) -> (f64, &'static str) {
        match self {
            UnitSystem::Metric => (celsius, "°C"),
            UnitSystem::Imperial => (celsius_to_fahrenheit(celsius), "°F"),
        }
    }

    /// Pressure from PSI, with its unit label
    pub fn pressure(self, psi: f64) -> (f64, &'static str) {
        match self {
            UnitSystem::Metric => (psi_to_bar(psi), "bar"),
            UnitSystem::Imperial => (psi, "psi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_fahrenheit_conversion() {
        assert!((celsius_to_fahrenheit(0.0) - 32.0).abs() < 0.01);
        assert!((celsius_to_fahrenheit(95.0) - 203.0).abs() < 0.01);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_pressure_conversion() {
        assert!((psi_to_kpa(14.504) - 100.0).abs() < 0.01);
        assert!((psi_to_bar(14.504) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_kmh_mph_conversion() {
        assert!((kmh_to_mph(100.0) - 62.14).abs() < 0.01);
        assert!((mph_to_kmh(62.14) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_unit_system_labels() {
        assert_eq!(UnitSystem::Metric.speed(120.0), (120.0, "km/h"));
        assert_eq!(UnitSystem::Imperial.pressure(40.0), (40.0, "psi"));
        let (f, label) = UnitSystem::Imperial.temperature(100.0);
        assert!((f - 212.0).abs() < 1e-9);
        assert_eq!(label, "°F");
    }
}
