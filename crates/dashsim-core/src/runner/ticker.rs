//! Fixed-interval loop ticker
//!
//! Every loop owns one [`LoopTicker`]. Each tick waits for the next interval
//! boundary or the shutdown token, whichever comes first, with shutdown
//! checked first. Observed intervals are published through [`LoopStats`] so
//! other loops can read them without touching the ticker.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Observed interval beyond `target * DEADLINE_FACTOR` counts as a miss
pub const DEADLINE_FACTOR: f64 = 1.5;

/// Per-loop counters, written by the owning loop and read by anyone
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    missed_deadlines: AtomicU64,
    last_interval_us: AtomicU64,
    max_interval_us: AtomicU64,
    last_busy_us: AtomicU64,
    shutdown_observed: AtomicU64,
}

impl LoopStats {
    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that arrived more than 50% late
    pub fn missed_deadlines(&self) -> u64 {
        self.missed_deadlines.load(Ordering::Relaxed)
    }

    /// Most recent tick-to-tick interval
    pub fn last_interval(&self) -> Duration {
        Duration::from_micros(self.last_interval_us.load(Ordering::Relaxed))
    }

    /// Longest tick-to-tick interval seen
    pub fn max_interval(&self) -> Duration {
        Duration::from_micros(self.max_interval_us.load(Ordering::Relaxed))
    }

    /// Time the loop spent working between its last two waits
    pub fn last_busy(&self) -> Duration {
        Duration::from_micros(self.last_busy_us.load(Ordering::Relaxed))
    }

    /// How many times the loop saw the shutdown signal
    pub fn shutdown_observed(&self) -> u64 {
        self.shutdown_observed.load(Ordering::Relaxed)
    }

    /// Consistent-enough copy for reporting
    pub fn report(&self, name: &'static str) -> LoopReport {
        LoopReport {
            name,
            ticks: self.ticks(),
            missed_deadlines: self.missed_deadlines(),
            max_interval_us: self.max_interval_us.load(Ordering::Relaxed),
            shutdown_observed: self.shutdown_observed(),
        }
    }
}

/// Final counters of one loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    /// Loop name
    pub name: &'static str,
    /// Completed ticks
    pub ticks: u64,
    /// Ticks later than the miss threshold
    pub missed_deadlines: u64,
    /// Longest observed interval in µs
    pub max_interval_us: u64,
    /// Times the loop saw the shutdown signal
    pub shutdown_observed: u64,
}

/// Interval timer with deadline accounting and a shutdown check
pub struct LoopTicker {
    name: &'static str,
    target: Duration,
    interval: Interval,
    last_tick: Option<Instant>,
    stats: Arc<LoopStats>,
}

impl LoopTicker {
    /// Create a ticker; the first tick completes immediately
    pub fn new(name: &'static str, target: Duration, stats: Arc<LoopStats>) -> Self {
        let mut interval = time::interval(target);
        // Late ticks stay late; nothing bursts to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            name,
            target,
            interval,
            last_tick: None,
            stats,
        }
    }

    /// Target interval
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Shared counters of this loop
    pub fn stats(&self) -> &Arc<LoopStats> {
        &self.stats
    }

    /// Wait for the next tick
    ///
    /// Returns `None` once `shutdown` is cancelled, even if a tick is
    /// already due.
    pub async fn tick(&mut self, shutdown: &CancellationToken) -> Option<Instant> {
        if let Some(last) = self.last_tick {
            self.stats
                .last_busy_us
                .store(micros(last.elapsed()), Ordering::Relaxed);
        }

        let now = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                self.stats.shutdown_observed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(loop_name = self.name, "Shutdown observed");
                return None;
            }
            // tick() yields the scheduled deadline; measure the actual wake-up
            _ = self.interval.tick() => Instant::now(),
        };

        if let Some(last) = self.last_tick {
            self.record_interval(now.saturating_duration_since(last));
        }
        self.last_tick = Some(now);
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        Some(now)
    }

    fn record_interval(&self, observed: Duration) {
        let us = micros(observed);
        self.stats.last_interval_us.store(us, Ordering::Relaxed);
        self.stats.max_interval_us.fetch_max(us, Ordering::Relaxed);

        if observed > self.target.mul_f64(DEADLINE_FACTOR) {
            let missed = self.stats.missed_deadlines.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                loop_name = self.name,
                observed_us = us,
                target_us = micros(self.target),
                missed,
                "Loop missed its deadline"
            );
        }
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
