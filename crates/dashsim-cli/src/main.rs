//! dashsim - instrument cluster simulator
//!
//! Usage:
//!   dashsim                          realistic drive until Ctrl-C
//!   dashsim --mode demo --duration 60
//!   dashsim --config dashsim.json --imperial --record
//!   dashsim --print-default-config > dashsim.json

mod console;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dashsim_core::config::Settings;
use dashsim_core::datalog::{TelemetryLog, TelemetryRecorder};
use dashsim_core::physics::SimulationMode;
use dashsim_core::render::Renderer;
use dashsim_core::runner::{RunReport, Runner};
use dashsim_core::unit_conversion::UnitSystem;
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleRenderer;

#[derive(Parser, Debug)]
#[command(name = "dashsim", version)]
#[command(about = "Vehicle instrument cluster simulator with a real-time telemetry core")]
struct Cli {
    /// JSON settings file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Simulation mode: realistic, demo, manual or replay
    #[arg(short, long)]
    mode: Option<SimulationMode>,

    /// Seed for sensor noise and driving intent
    #[arg(long)]
    seed: Option<u64>,

    /// Stop automatically after this many seconds
    #[arg(short, long, value_name = "SECS", value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Show mph, °F and PSI
    #[arg(long)]
    imperial: bool,

    /// Keep an in-memory telemetry log and print its summary at exit
    #[arg(long)]
    record: bool,

    /// Debug logging and a JSON run report on exit
    #[arg(long)]
    debug: bool,

    /// Print the default settings as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

fn parse_duration(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("{arg} is not a valid number of seconds"))
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "debug"
    } else {
        "warn,dashsim=info,dashsim_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(mode) = cli.mode {
        settings.simulation.mode = mode;
    }
    if let Some(seed) = cli.seed {
        settings.simulation.seed = Some(seed);
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn build_renderer(cli: &Cli) -> (Box<dyn Renderer>, Option<TelemetryLog>) {
    let units = if cli.imperial {
        UnitSystem::Imperial
    } else {
        UnitSystem::Metric
    };
    let console: Box<dyn Renderer> = Box::new(ConsoleRenderer::new(units));

    if cli.record {
        let recorder = TelemetryRecorder::new().forwarding_to(console);
        let log = recorder.log();
        (Box::new(recorder), Some(log))
    } else {
        (console, None)
    }
}

fn print_report(report: &RunReport, log: Option<&TelemetryLog>) {
    let sim = &report.simulator;
    let perf = &report.performance;

    println!("Session {} ({})", report.session_id, sim.mode);
    println!(
        "  started {}, ran {:.1}s",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.run_time.as_secs_f64()
    );
    println!(
        "  {} simulator ticks, {} frames, {} clamped states",
        sim.tick_count, report.frames_rendered, sim.error_count
    );
    println!(
        "  avg update {:.3} ms, {:.1} fps, {:.1} ticks/s",
        sim.avg_update_ms, perf.smoothed_fps, perf.smoothed_tick_rate
    );
    for l in &report.loops {
        println!(
            "  {:<9} {:>7} ticks, {} missed deadlines, max interval {:.1} ms",
            l.name,
            l.ticks,
            l.missed_deadlines,
            l.max_interval_us as f64 / 1000.0
        );
    }
    println!(
        "  final: {:.1} km/h, {:.0} rpm, fuel {:.2}%, {:.1} °C",
        sim.current.speed_kmh, sim.current.rpm, sim.current.fuel_level, sim.current.engine_temp_c
    );

    if let Some(log) = log {
        println!("Telemetry log:");
        for line in log.summary().to_string().lines() {
            println!("  {line}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        println!("{}", Settings::default().to_json_pretty()?);
        return Ok(());
    }

    init_tracing(cli.debug);
    let settings = load_settings(&cli)?;
    let (renderer, log) = build_renderer(&cli);

    let mut runner = Runner::new(settings, renderer);
    runner.start().await.context("Failed to start simulator")?;
    let handle = runner.handle();

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            return;
        }
        ctrl_c.request_shutdown();
    });

    if let Some(duration) = cli.duration {
        let timer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            tracing::info!(secs = duration.as_secs_f64(), "Run duration reached");
            timer.request_shutdown();
        });
    }

    let report = runner.join().await?;

    print_report(&report, log.as_ref());
    if cli.debug {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
