//! The three loop bodies
//!
//! Each loop holds a drop guard on the shutdown token, so a loop that ends
//! for any reason (including a panic) stops the others too.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tokio::time::Instant;

use super::{LoopTicker, RunnerContext};
use crate::monitor::{
    NoopProbe, PerformanceMonitor, PerformanceStats, ResourceProbe, ResourceUsage,
};
use crate::render::{RenderError, Renderer};
use crate::simulator::{SimulatorCommand, SimulatorSession, SimulatorStats};
use crate::store::TelemetryWriter;

/// Advance the session once per tick and publish the result
///
/// The model is fed the nominal interval, not the measured one, so a given
/// seed always yields the same sequence of states.
pub(super) async fn simulation_loop(
    ctx: Arc<RunnerContext>,
    mut session: SimulatorSession,
    writer: TelemetryWriter,
    mut commands: mpsc::UnboundedReceiver<SimulatorCommand>,
) -> SimulatorStats {
    let _guard = ctx.shutdown.clone().drop_guard();
    let interval = ctx.settings.performance.data_interval();
    let dt = interval.as_secs_f64();
    let mut ticker = LoopTicker::new("simulator", interval, ctx.loops.simulator.clone());

    while ticker.tick(&ctx.shutdown).await.is_some() {
        while let Ok(command) = commands.try_recv() {
            session.apply(command);
        }
        if ctx.is_paused() {
            continue;
        }

        let started = Instant::now();
        let state = session.tick(dt);
        writer.publish(state);
        session.record_update_time(started.elapsed());
        ctx.simulator_errors
            .store(session.error_count(), Ordering::Relaxed);
    }

    session.log_summary();
    session.stats()
}

/// Hand the latest published state to the renderer once per tick
pub(super) async fn consumer_loop(
    ctx: Arc<RunnerContext>,
    mut renderer: Box<dyn Renderer>,
    opened: oneshot::Sender<Result<(), RenderError>>,
) {
    let _guard = ctx.shutdown.clone().drop_guard();

    if let Err(e) = renderer.open() {
        let _ = opened.send(Err(e));
        return;
    }
    let _ = opened.send(Ok(()));

    let interval = ctx.settings.performance.consumer_interval();
    let mut ticker = LoopTicker::new("consumer", interval, ctx.loops.consumer.clone());

    while ticker.tick(&ctx.shutdown).await.is_some() {
        let state = ctx.reader.snapshot();
        // Nothing published yet
        if state.is_sentinel() {
            continue;
        }
        renderer.render(&state);
        ctx.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    renderer.close();
}

/// Sample counters and publish performance statistics
pub(super) async fn monitor_loop(
    ctx: Arc<RunnerContext>,
    mut probe: Box<dyn ResourceProbe>,
) -> PerformanceStats {
    let _guard = ctx.shutdown.clone().drop_guard();
    let interval = ctx.settings.performance.monitor_interval();
    let mut ticker = LoopTicker::new("monitor", interval, ctx.loops.monitor.clone());
    let mut monitor = PerformanceMonitor::new(Instant::now());

    while let Some(now) = ticker.tick(&ctx.shutdown).await {
        let reading = ctx.counters();
        let (returned, resources) = probe_resources(probe).await;
        probe = returned;
        let stats = monitor.sample(now, reading, resources);
        ctx.performance.store(Arc::new(stats.clone()));
    }

    // Fold in whatever happened since the last tick
    let now = Instant::now();
    let reading = ctx.counters();
    let (_, resources) = probe_resources(probe).await;
    let stats = monitor.sample(now, reading, resources).clone();
    ctx.performance.store(Arc::new(stats.clone()));
    stats
}

/// Run the probe on the blocking pool; probes may read files
async fn probe_resources(
    mut probe: Box<dyn ResourceProbe>,
) -> (Box<dyn ResourceProbe>, ResourceUsage) {
    match task::spawn_blocking(move || {
        let usage = probe.sample();
        (probe, usage)
    })
    .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "Resource probe failed; resource usage disabled");
            (Box::new(NoopProbe), ResourceUsage::default())
        }
    }
}
