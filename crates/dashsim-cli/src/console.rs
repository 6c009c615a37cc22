//! Single-line ANSI dashboard

use std::io::{self, Stdout, Write};

use dashsim_core::render::{RenderError, Renderer};
use dashsim_core::unit_conversion::UnitSystem;
use dashsim_core::vehicle::VehicleState;

const CLEAR_LINE: &str = "\r\x1b[2K";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Redraws one terminal line per frame
pub struct ConsoleRenderer {
    out: Stdout,
    units: UnitSystem,
    color: bool,
}

impl ConsoleRenderer {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            out: io::stdout(),
            units,
            color: std::env::var_os("NO_COLOR").is_none(),
        }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// Plain text of one dashboard line
pub fn format_line(state: &VehicleState, units: UnitSystem) -> String {
    let (speed, speed_unit) = units.speed(state.speed_kmh);
    let (temp, temp_unit) = units.temperature(state.engine_temp_c);
    let (oil, oil_unit) = units.pressure(state.oil_pressure);

    let oil_text = match oil_unit {
        "bar" => format!("{oil:.1} {oil_unit}"),
        _ => format!("{oil:.0} {oil_unit}"),
    };

    format!(
        "{:>5.1} {speed_unit} | {:>4.0} rpm | gear {} | fuel {:>5.1}% | {:>5.1} {temp_unit} | oil {oil_text} | {:>4.1} V",
        speed,
        state.rpm,
        state.gear_label(),
        state.fuel_level,
        temp,
        state.battery_voltage,
    )
}

impl Renderer for ConsoleRenderer {
    fn open(&mut self) -> Result<(), RenderError> {
        let mut out = self.out.lock();
        out.write_all(HIDE_CURSOR.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn render(&mut self, state: &VehicleState) {
        let mut line = format_line(state, self.units);

        let warnings: Vec<String> = state
            .warnings
            .kinds()
            .map(|kind| self.paint(kind.label(), RED))
            .collect();
        if !warnings.is_empty() {
            line.push_str(" | ");
            line.push_str(&warnings.join(" "));
        }
        if !state.valid {
            line.push_str(" | ");
            line.push_str(&self.paint("DEGRADED", YELLOW));
        }

        let mut out = self.out.lock();
        // A closed stdout is not worth stopping the simulation for.
        let _ = write!(out, "{CLEAR_LINE}{line}");
        let _ = out.flush();
    }

    fn close(&mut self) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{SHOW_CURSOR}");
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_line() {
        let mut state = VehicleState::initial(62.5, 25.0);
        state.speed_kmh = 100.0;
        state.rpm = 3000.0;
        state.gear = 5;
        state.engine_temp_c = 90.0;
        state.oil_pressure = 43.5;

        let line = format_line(&state, UnitSystem::Metric);
        assert!(line.contains("100.0 km/h"));
        assert!(line.contains("3000 rpm"));
        assert!(line.contains("gear 5"));
        assert!(line.contains("62.5%"));
        assert!(line.contains("90.0 °C"));
        assert!(line.contains("oil 3.0 bar"));
    }

    #[test]
    fn test_imperial_line() {
        let mut state = VehicleState::initial(75.0, 100.0);
        state.speed_kmh = 100.0;
        state.oil_pressure = 40.0;

        let line = format_line(&state, UnitSystem::Imperial);
        assert!(line.contains("62.1 mph"));
        assert!(line.contains("212.0 °F"));
        assert!(line.contains("oil 40 psi"));
        assert!(line.contains("gear N"));
    }
}
