//! Performance Monitor
//!
//! Samples counters published by the other loops at a slow cadence and
//! derives rates from them. The monitor only ever reads counters; it never
//! mutates simulator or consumer state.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Smoothing factor for frame and tick rates
pub const RATE_ALPHA: f64 = 0.1;

/// Exponentially weighted moving average; the first sample initializes it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    /// Create an empty average with smoothing factor `alpha` in (0, 1]
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Fold in a sample and return the new average
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(avg) => (1.0 - self.alpha) * avg + self.alpha * sample,
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// Current average, 0 before any sample
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// Memory/CPU readings from a [`ResourceProbe`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// Resident set size
    pub memory_bytes: Option<u64>,
    /// Process CPU time over wall time since the previous reading
    pub cpu_percent: Option<f64>,
}

/// Best-effort process resource readings
pub trait ResourceProbe: Send + 'static {
    /// Take one reading; unknown values are `None`
    fn sample(&mut self) -> ResourceUsage;
}

/// Probe that knows nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl ResourceProbe for NoopProbe {
    fn sample(&mut self) -> ResourceUsage {
        ResourceUsage::default()
    }
}

/// Reads `/proc/self` on Linux; reports nothing elsewhere
#[derive(Debug)]
pub struct ProcfsProbe {
    page_size: u64,
    clock_ticks: u64,
    last_cpu: Option<(u64, std::time::Instant)>,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsProbe {
    /// Create a probe, querying the page size and clock tick rate once
    pub fn new() -> Self {
        let (page_size, clock_ticks) = system_units();
        Self {
            page_size,
            clock_ticks,
            last_cpu: None,
        }
    }

    fn resident_bytes(&self) -> Option<u64> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        parse_statm_resident(&statm).map(|pages| pages * self.page_size)
    }

    fn cpu_percent(&mut self) -> Option<f64> {
        let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
        let ticks = parse_stat_cpu_ticks(&stat)?;
        let now = std::time::Instant::now();

        let percent = self.last_cpu.and_then(|(prev_ticks, prev_at)| {
            let wall = now.duration_since(prev_at).as_secs_f64();
            if wall <= 0.0 || self.clock_ticks == 0 {
                return None;
            }
            let cpu = ticks.saturating_sub(prev_ticks) as f64 / self.clock_ticks as f64;
            Some(cpu / wall * 100.0)
        });
        self.last_cpu = Some((ticks, now));
        percent
    }
}

impl ResourceProbe for ProcfsProbe {
    fn sample(&mut self) -> ResourceUsage {
        ResourceUsage {
            memory_bytes: self.resident_bytes(),
            cpu_percent: self.cpu_percent(),
        }
    }
}

#[cfg(target_os = "linux")]
fn system_units() -> (u64, u64) {
    // SAFETY: sysconf has no preconditions and only reads system constants.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    // SAFETY: as above.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    (
        u64::try_from(page).unwrap_or(4096),
        u64::try_from(ticks).unwrap_or(100),
    )
}

#[cfg(not(target_os = "linux"))]
fn system_units() -> (u64, u64) {
    (4096, 100)
}

/// Second field of `/proc/self/statm`: resident pages
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// utime + stime (fields 14 and 15) of `/proc/self/stat`
///
/// The command name in field 2 may contain spaces, so fields are counted
/// from the closing parenthesis.
fn parse_stat_cpu_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

/// Missed deadlines per loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopMisses {
    /// Simulator loop
    pub simulator: u64,
    /// Consumer loop
    pub consumer: u64,
    /// Monitor loop
    pub monitor: u64,
}

impl LoopMisses {
    /// Sum over all loops
    pub fn total(&self) -> u64 {
        self.simulator + self.consumer + self.monitor
    }
}

/// Counter values read by the monitor loop at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterReading {
    /// Frames handed to the renderer so far
    pub frames_rendered: u64,
    /// Simulator ticks so far
    pub simulator_ticks: u64,
    /// Simulator states clamped beyond tolerance so far
    pub simulator_errors: u64,
    /// Missed deadlines per loop so far
    pub missed: LoopMisses,
}

/// One monitor tick's observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSample {
    /// Time since the monitor was started
    pub elapsed: Duration,
    /// Frames rendered per second since the previous sample
    pub consumer_fps: f64,
    /// Simulator ticks per second since the previous sample
    pub simulator_tick_rate: f64,
    /// Missed deadlines over all loops so far
    pub missed_deadlines: u64,
    /// Best-effort process usage
    pub resources: ResourceUsage,
}

/// Read-only statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Most recent sample, if any
    pub latest: Option<PerformanceSample>,
    /// Smoothed consumer frame rate
    pub smoothed_fps: f64,
    /// Smoothed simulator tick rate
    pub smoothed_tick_rate: f64,
    /// Samples taken
    pub samples: u64,
    /// Missed deadlines per loop
    pub missed_deadlines: LoopMisses,
    /// Simulator error count as last reported
    pub simulator_errors: u64,
}

/// Derives rates from successive counter readings
pub struct PerformanceMonitor {
    started: Instant,
    last_at: Instant,
    last: CounterReading,
    fps: Ewma,
    tick_rate: Ewma,
    stats: PerformanceStats,
}

impl PerformanceMonitor {
    /// Create a monitor whose baseline is zero counters at `started`
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            last_at: started,
            last: CounterReading::default(),
            fps: Ewma::new(RATE_ALPHA),
            tick_rate: Ewma::new(RATE_ALPHA),
            stats: PerformanceStats::default(),
        }
    }

    /// Fold in one reading taken at `now`
    ///
    /// A reading with no elapsed time since the previous one keeps the
    /// previous rates.
    pub fn sample(
        &mut self,
        now: Instant,
        reading: CounterReading,
        resources: ResourceUsage,
    ) -> &PerformanceStats {
        let dt = now.saturating_duration_since(self.last_at).as_secs_f64();

        let (fps, tick_rate) = if dt > 0.0 {
            let frames = reading.frames_rendered.saturating_sub(self.last.frames_rendered);
            let ticks = reading.simulator_ticks.saturating_sub(self.last.simulator_ticks);
            let fps = frames as f64 / dt;
            let tick_rate = ticks as f64 / dt;
            self.fps.update(fps);
            self.tick_rate.update(tick_rate);
            self.last_at = now;
            self.last = reading;
            (fps, tick_rate)
        } else {
            let prev = self.stats.latest.unwrap_or_default();
            (prev.consumer_fps, prev.simulator_tick_rate)
        };

        let sample = PerformanceSample {
            elapsed: now.saturating_duration_since(self.started),
            consumer_fps: fps,
            simulator_tick_rate: tick_rate,
            missed_deadlines: reading.missed.total(),
            resources,
        };

        self.stats.latest = Some(sample);
        self.stats.smoothed_fps = self.fps.value();
        self.stats.smoothed_tick_rate = self.tick_rate.value();
        self.stats.samples += 1;
        self.stats.missed_deadlines = reading.missed;
        self.stats.simulator_errors = reading.simulator_errors;
        &self.stats
    }

    /// Latest statistics
    pub fn stats(&self) -> &PerformanceStats {
        &self.stats
    }
}
