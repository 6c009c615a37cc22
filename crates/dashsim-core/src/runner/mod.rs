//! Scheduler/Runner
//!
//! Drives three independently clocked loops on the tokio runtime:
//!
//! - **simulator**: advances the [`SimulatorSession`] and publishes into the
//!   telemetry store (default 100 Hz)
//! - **consumer**: snapshots the store and hands the state to a [`Renderer`]
//!   (default 60 Hz)
//! - **monitor**: samples loop counters into [`PerformanceStats`] (default 10 Hz)
//!
//! Loops never wait on each other. They share one [`RunnerContext`] holding
//! the store reader, the counters and a single shutdown token; each loop
//! checks the token before every tick and exits within one tick of it being
//! cancelled.

mod loops;
mod ticker;

pub use ticker::{LoopReport, LoopStats, LoopTicker, DEADLINE_FACTOR};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConfigError, Settings};
use crate::monitor::{
    CounterReading, LoopMisses, PerformanceStats, ProcfsProbe, ResourceProbe,
};
use crate::physics::SimulationMode;
use crate::render::Renderer;
use crate::simulator::{SimulatorCommand, SimulatorSession, SimulatorStats};
use crate::store::{telemetry_channel, TelemetryReader, TelemetryWriter};
use crate::vehicle::VehicleState;

/// Errors surfaced by the runner
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),

    /// Request not allowed in the current state
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        /// What was attempted
        action: &'static str,
        /// State at the time of the request
        state: RunnerState,
    },

    /// `start` was called outside a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// The renderer's `open` failed
    #[error("Renderer failed to start: {0}")]
    RendererStart(String),

    /// A loop task ended abnormally
    #[error("{0} loop panicked")]
    LoopPanicked(&'static str),
}

/// Lifecycle state of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum RunnerState {
    /// Created, loops not started
    Initializing = 0,
    /// All loops running
    Running = 1,
    /// Simulator suspended, consumers still rendering
    Paused = 2,
    /// Startup failed
    Error = 3,
    /// Shutdown requested
    ShuttingDown = 4,
}

impl RunnerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunnerState::Initializing,
            1 => RunnerState::Running,
            2 => RunnerState::Paused,
            3 => RunnerState::Error,
            _ => RunnerState::ShuttingDown,
        }
    }

    /// Whether the state machine allows moving from `self` to `to`
    pub fn can_transition_to(self, to: RunnerState) -> bool {
        use RunnerState::*;
        matches!(
            (self, to),
            (Initializing, Running)
                | (Initializing, Error)
                | (Initializing, ShuttingDown)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, ShuttingDown)
                | (Paused, ShuttingDown)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Error | RunnerState::ShuttingDown)
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Initializing => "initializing",
            RunnerState::Running => "running",
            RunnerState::Paused => "paused",
            RunnerState::Error => "in error",
            RunnerState::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

/// Atomically updated [`RunnerState`]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(RunnerState::Initializing as u8))
    }

    fn get(&self) -> RunnerState {
        RunnerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` if allowed; returns the previous state
    fn transition(&self, action: &'static str, to: RunnerState) -> Result<RunnerState, RunnerError> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                RunnerState::from_u8(current)
                    .can_transition_to(to)
                    .then_some(to as u8)
            })
            .map(RunnerState::from_u8)
            .map_err(|current| RunnerError::InvalidTransition {
                action,
                state: RunnerState::from_u8(current),
            })
    }

    fn fail(&self) {
        self.0.store(RunnerState::Error as u8, Ordering::Release);
    }
}

/// Counters of all three loops
#[derive(Default)]
pub(crate) struct LoopSet {
    pub(crate) simulator: Arc<LoopStats>,
    pub(crate) consumer: Arc<LoopStats>,
    pub(crate) monitor: Arc<LoopStats>,
}

/// Everything the loops share, built once per runner
pub(crate) struct RunnerContext {
    pub(crate) settings: Settings,
    state: StateCell,
    pub(crate) shutdown: CancellationToken,
    pub(crate) reader: TelemetryReader,
    commands: mpsc::UnboundedSender<SimulatorCommand>,
    pub(crate) loops: LoopSet,
    pub(crate) frames_rendered: AtomicU64,
    pub(crate) simulator_errors: AtomicU64,
    pub(crate) performance: ArcSwap<PerformanceStats>,
}

impl RunnerContext {
    pub(crate) fn is_paused(&self) -> bool {
        self.state.get() == RunnerState::Paused
    }

    /// Current counter values for the monitor
    pub(crate) fn counters(&self) -> CounterReading {
        CounterReading {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            simulator_ticks: self.loops.simulator.ticks(),
            simulator_errors: self.simulator_errors.load(Ordering::Relaxed),
            missed: LoopMisses {
                simulator: self.loops.simulator.missed_deadlines(),
                consumer: self.loops.consumer.missed_deadlines(),
                monitor: self.loops.monitor.missed_deadlines(),
            },
        }
    }
}

/// Cheap, cloneable control surface of a runner
#[derive(Clone)]
pub struct RunnerHandle {
    ctx: Arc<RunnerContext>,
}

impl RunnerHandle {
    /// Ask every loop to stop; calling it again has no further effect
    pub fn request_shutdown(&self) {
        match self.ctx.state.transition("shut down", RunnerState::ShuttingDown) {
            Ok(previous) => tracing::info!(from = %previous, "Shutdown requested"),
            Err(_) => tracing::debug!(state = %self.ctx.state.get(), "Shutdown already requested"),
        }
        self.ctx.shutdown.cancel();
    }

    /// Whether the shutdown signal has been raised
    pub fn is_shutdown_requested(&self) -> bool {
        self.ctx.shutdown.is_cancelled()
    }

    /// Suspend the simulator; consumers keep seeing the last state
    pub fn pause(&self) -> Result<(), RunnerError> {
        self.ctx.state.transition("pause", RunnerState::Paused)?;
        tracing::info!("Simulation paused");
        Ok(())
    }

    /// Resume a paused simulator
    pub fn resume(&self) -> Result<(), RunnerError> {
        self.ctx.state.transition("resume", RunnerState::Running)?;
        tracing::info!("Simulation resumed");
        Ok(())
    }

    /// Switch simulation mode from the next tick on
    pub fn set_mode(&self, mode: SimulationMode) -> Result<(), RunnerError> {
        self.send("set mode", SimulatorCommand::SetMode(mode))
    }

    /// Replace the state emitted in manual mode
    pub fn inject(&self, state: VehicleState) -> Result<(), RunnerError> {
        self.send("inject state", SimulatorCommand::Inject(state))
    }

    /// Override (`Some`) or release (`None`) the realistic target speed
    pub fn set_target_speed(&self, kmh: Option<f64>) -> Result<(), RunnerError> {
        self.send("set target speed", SimulatorCommand::SetTargetSpeed(kmh))
    }

    fn send(&self, action: &'static str, command: SimulatorCommand) -> Result<(), RunnerError> {
        let state = self.ctx.state.get();
        if state.is_terminal() {
            return Err(RunnerError::InvalidTransition { action, state });
        }
        self.ctx
            .commands
            .send(command)
            .map_err(|_| RunnerError::InvalidTransition { action, state })
    }

    /// Latest published vehicle state (the sentinel before the first tick)
    pub fn snapshot(&self) -> VehicleState {
        self.ctx.reader.snapshot()
    }

    /// Latest performance statistics
    pub fn performance(&self) -> PerformanceStats {
        self.ctx.performance.load_full().as_ref().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunnerState {
        self.ctx.state.get()
    }

    /// A new reader attached to the telemetry store
    pub fn reader(&self) -> TelemetryReader {
        self.ctx.reader.clone()
    }
}

/// Final report returned by [`Runner::join`]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Session that ran
    pub session_id: Uuid,
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    /// Time from `start()` until every loop had exited
    pub run_time: Duration,
    /// Final simulator statistics
    pub simulator: SimulatorStats,
    /// Final monitor statistics
    pub performance: PerformanceStats,
    /// Frames handed to the renderer
    pub frames_rendered: u64,
    /// Simulator, consumer and monitor counters
    pub loops: Vec<LoopReport>,
}

impl RunReport {
    /// Report of a loop by name
    pub fn loop_report(&self, name: &str) -> Option<&LoopReport> {
        self.loops.iter().find(|l| l.name == name)
    }
}

/// Parts consumed by `start()`
struct Pending {
    session: SimulatorSession,
    writer: TelemetryWriter,
    commands: mpsc::UnboundedReceiver<SimulatorCommand>,
    renderer: Box<dyn Renderer>,
    probe: Box<dyn ResourceProbe>,
}

struct LoopTasks {
    simulator: JoinHandle<SimulatorStats>,
    consumer: JoinHandle<()>,
    monitor: JoinHandle<PerformanceStats>,
}

/// Owns the loops of one simulator session
pub struct Runner {
    ctx: Arc<RunnerContext>,
    session_id: Uuid,
    pending: Option<Pending>,
    tasks: Option<LoopTasks>,
    started_at: DateTime<Utc>,
    started: Option<Instant>,
}

impl Runner {
    /// Create a runner; nothing runs until [`Runner::start`]
    ///
    /// Settings are validated by `start()`, which fails with
    /// [`RunnerError::Config`] if they are out of range.
    pub fn new(settings: Settings, renderer: Box<dyn Renderer>) -> Self {
        let session = SimulatorSession::new(&settings);
        let (writer, reader) = telemetry_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let ctx = Arc::new(RunnerContext {
            settings,
            state: StateCell::new(),
            shutdown: CancellationToken::new(),
            reader,
            commands: commands_tx,
            loops: LoopSet::default(),
            frames_rendered: AtomicU64::new(0),
            simulator_errors: AtomicU64::new(0),
            performance: ArcSwap::from_pointee(PerformanceStats::default()),
        });

        Self {
            ctx,
            session_id: session.id(),
            pending: Some(Pending {
                session,
                writer,
                commands: commands_rx,
                renderer,
                probe: Box::new(ProcfsProbe::new()),
            }),
            tasks: None,
            started_at: Utc::now(),
            started: None,
        }
    }

    /// Replace the resource probe used by the monitor loop
    pub fn with_probe(mut self, probe: Box<dyn ResourceProbe>) -> Self {
        if let Some(pending) = self.pending.as_mut() {
            pending.probe = probe;
        }
        self
    }

    /// Control surface usable from other tasks
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            ctx: self.ctx.clone(),
        }
    }

    /// Session identifier
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunnerState {
        self.ctx.state.get()
    }

    /// Start all three loops
    ///
    /// On failure every loop that was already started is stopped and
    /// awaited, the runner moves to [`RunnerState::Error`], and the error is
    /// returned. There is no retry.
    pub async fn start(&mut self) -> Result<(), RunnerError> {
        let state = self.ctx.state.get();
        if state != RunnerState::Initializing {
            return Err(RunnerError::InvalidTransition {
                action: "start",
                state,
            });
        }
        let pending = self.pending.take().ok_or(RunnerError::InvalidTransition {
            action: "start",
            state,
        })?;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.ctx.state.fail();
                tracing::error!(error = %e, "Runner started outside a tokio runtime");
                return Err(RunnerError::NoRuntime(e.to_string()));
            }
        };

        if let Err(e) = self.ctx.settings.validate() {
            self.ctx.state.fail();
            tracing::error!(error = %e, "Refusing to start with invalid settings");
            return Err(e.into());
        }

        let perf = &self.ctx.settings.performance;
        tracing::info!(
            session = %self.session_id,
            mode = %pending.session.mode(),
            data_hz = perf.data_rate_hz,
            consumer_hz = perf.consumer_rate_hz,
            monitor_hz = perf.monitor_rate_hz,
            "Starting runner"
        );

        self.started_at = Utc::now();
        self.started = Some(Instant::now());

        let simulator = runtime.spawn(loops::simulation_loop(
            self.ctx.clone(),
            pending.session,
            pending.writer,
            pending.commands,
        ));
        let monitor = runtime.spawn(loops::monitor_loop(self.ctx.clone(), pending.probe));

        let (opened_tx, opened_rx) = oneshot::channel();
        let consumer = runtime.spawn(loops::consumer_loop(
            self.ctx.clone(),
            pending.renderer,
            opened_tx,
        ));

        let tasks = LoopTasks {
            simulator,
            consumer,
            monitor,
        };

        let opened = match opened_rx.await {
            Ok(result) => result.map_err(|e| RunnerError::RendererStart(e.to_string())),
            Err(_) => Err(RunnerError::RendererStart(
                "consumer loop exited before opening the renderer".to_string(),
            )),
        };

        if let Err(e) = opened {
            tracing::error!(error = %e, "Startup failed; stopping loops");
            self.ctx.shutdown.cancel();
            // Panics are irrelevant here; the startup error is what gets reported.
            let _ = tokio::join!(tasks.simulator, tasks.consumer, tasks.monitor);
            self.ctx.state.fail();
            return Err(e);
        }

        self.tasks = Some(tasks);
        match self.ctx.state.transition("start", RunnerState::Running) {
            Ok(_) => tracing::info!("Runner running"),
            // Shutdown raced with startup; join() collects the loops.
            Err(e) => tracing::debug!(error = %e, "Runner stopped during startup"),
        }
        Ok(())
    }

    /// Wait for the shutdown signal, then for every loop to exit
    pub async fn join(mut self) -> Result<RunReport, RunnerError> {
        let Some(tasks) = self.tasks.take() else {
            return Err(RunnerError::InvalidTransition {
                action: "join",
                state: self.ctx.state.get(),
            });
        };

        self.ctx.shutdown.cancelled().await;
        // A loop that died on its own cancels the token without a request.
        let _ = self
            .ctx
            .state
            .transition("shut down", RunnerState::ShuttingDown);

        let (simulator, consumer, monitor) =
            tokio::join!(tasks.simulator, tasks.consumer, tasks.monitor);

        let simulator = simulator.map_err(|e| panicked("simulator", e))?;
        consumer.map_err(|e| panicked("consumer", e))?;
        let performance = monitor.map_err(|e| panicked("monitor", e))?;

        let loops = &self.ctx.loops;
        let report = RunReport {
            session_id: self.session_id,
            started_at: self.started_at,
            run_time: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            simulator,
            performance,
            frames_rendered: self.ctx.frames_rendered.load(Ordering::Relaxed),
            loops: vec![
                loops.simulator.report("simulator"),
                loops.consumer.report("consumer"),
                loops.monitor.report("monitor"),
            ],
        };

        tracing::info!(
            session = %report.session_id,
            run_time_ms = report.run_time.as_millis() as u64,
            ticks = report.simulator.tick_count,
            frames = report.frames_rendered,
            missed_deadlines = report.performance.missed_deadlines.total(),
            "Runner stopped"
        );
        Ok(report)
    }

    /// Request shutdown and wait for every loop to exit
    pub async fn shutdown(self) -> Result<RunReport, RunnerError> {
        self.handle().request_shutdown();
        self.join().await
    }
}

impl Drop for Runner {
    /// A started runner dropped without `join` stops its loops
    fn drop(&mut self) {
        if self.tasks.is_some() {
            tracing::debug!(session = %self.session_id, "Runner dropped while loops were running");
            self.handle().request_shutdown();
        }
    }
}

fn panicked(name: &'static str, error: tokio::task::JoinError) -> RunnerError {
    tracing::error!(loop_name = name, error = %error, "Loop task failed");
    RunnerError::LoopPanicked(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use RunnerState::*;
        assert!(Initializing.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(ShuttingDown));
        assert!(!Initializing.can_transition_to(Paused));
        assert!(!ShuttingDown.can_transition_to(Running));
        assert!(!Error.can_transition_to(ShuttingDown));
        assert!(!Running.can_transition_to(Initializing));
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let cell = StateCell::new();
        let err = cell.transition("pause", RunnerState::Paused).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::InvalidTransition {
                action: "pause",
                state: RunnerState::Initializing
            }
        ));
        assert_eq!(cell.get(), RunnerState::Initializing);

        assert_eq!(
            cell.transition("start", RunnerState::Running).unwrap(),
            RunnerState::Initializing
        );
        assert_eq!(cell.get(), RunnerState::Running);
    }

    #[test]
    fn test_error_messages() {
        let err = RunnerError::InvalidTransition {
            action: "resume",
            state: RunnerState::Running,
        };
        assert_eq!(err.to_string(), "Cannot resume while running");
        assert_eq!(
            RunnerError::LoopPanicked("monitor").to_string(),
            "monitor loop panicked"
        );
    }
}
