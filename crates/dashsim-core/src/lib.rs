//! # DashSim Core Library
//!
//! Real-time telemetry core for the DashSim instrument cluster simulator.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The vehicle data model and its declared channel ranges
//! - The physics/state model (realistic, demo, manual and replay modes)
//! - The simulator session that advances and validates vehicle state
//! - A single-writer/multi-reader telemetry store
//! - The multi-rate runner driving the simulator, consumer and monitor loops
//! - Performance monitoring and an in-memory telemetry recorder
//!
//! ## Example
//!
//! ```rust,ignore
//! use dashsim_core::{config::Settings, render::NullRenderer, runner::Runner};
//!
//! let settings = Settings::load("dashsim.json")?;
//! let mut runner = Runner::new(settings, Box::new(NullRenderer));
//! runner.start().await?;
//!
//! let handle = runner.handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.request_shutdown();
//! });
//!
//! let report = runner.join().await?;
//! println!("{} ticks", report.simulator.tick_count);
//! ```

pub mod config;
pub mod datalog;
pub mod monitor;
pub mod physics;
pub mod render;
pub mod runner;
pub mod simulator;
pub mod store;
pub mod unit_conversion;
pub mod vehicle;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{PhysicsConstants, SafetySettings, Settings};
    pub use crate::datalog::{TelemetryLog, TelemetryRecorder};
    pub use crate::monitor::{PerformanceSample, PerformanceStats};
    pub use crate::physics::{ControlInput, SimulationMode};
    pub use crate::render::{NullRenderer, RenderError, Renderer};
    pub use crate::runner::{RunReport, Runner, RunnerError, RunnerHandle, RunnerState};
    pub use crate::simulator::{SimulatorSession, SimulatorStats};
    pub use crate::store::{telemetry_channel, TelemetryReader, TelemetryWriter};
    pub use crate::vehicle::{StatusFlags, VehicleState, WarningKind, Warnings};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
