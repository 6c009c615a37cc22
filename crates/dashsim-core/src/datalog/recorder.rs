//! Telemetry recorder
//!
//! A [`Renderer`] that records the states it is handed into a bounded ring
//! buffer, optionally passing them on to another renderer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Channel, LogEntry, LogSummary};
use crate::render::{RenderError, Renderer};
use crate::vehicle::VehicleState;

/// Maximum entries kept in memory; the oldest are dropped first
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 10.0;

const MIN_SAMPLE_RATE_HZ: f64 = 1.0;
const MAX_SAMPLE_RATE_HZ: f64 = 200.0;

struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dropped: u64,
}

/// Read handle onto a recorder's buffer; clone freely
#[derive(Clone)]
pub struct TelemetryLog {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl TelemetryLog {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(Mutex::new(LogBuffer {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                capacity,
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        // A panic while holding the lock cannot leave the ring inconsistent.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, entry: LogEntry) {
        let mut buffer = self.lock();
        if buffer.entries.len() >= buffer.capacity {
            buffer.entries.pop_front();
            buffer.dropped += 1;
        }
        buffer.entries.push_back(entry);
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries kept
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Entries pushed out of the ring by newer ones
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Copy of all entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().copied().collect()
    }

    /// Values of one channel, oldest first
    pub fn channel_values(&self, channel: Channel) -> Vec<f64> {
        self.lock().entries.iter().map(|e| e.value(channel)).collect()
    }

    /// Aggregate view over the recorded entries
    pub fn summary(&self) -> LogSummary {
        LogSummary::from_entries(self.lock().entries.iter())
    }

    /// Clear all recorded data
    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.entries.clear();
        buffer.dropped = 0;
    }
}

/// Records rendered states at a limited rate
pub struct TelemetryRecorder {
    log: TelemetryLog,
    sample_rate: f64,
    last_sample: Option<Duration>,
    last_sequence: u64,
    inner: Option<Box<dyn Renderer>>,
}

impl TelemetryRecorder {
    /// Create a recorder with the default capacity and sample rate
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a recorder keeping at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: TelemetryLog::new(capacity),
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            last_sample: None,
            last_sequence: 0,
            inner: None,
        }
    }

    /// Pass every state on to `inner` after recording it
    pub fn forwarding_to(mut self, inner: Box<dyn Renderer>) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Set the target sample rate in Hz (clamped to 1..=200)
    pub fn set_sample_rate(&mut self, rate: f64) {
        self.sample_rate = if rate.is_finite() {
            rate.clamp(MIN_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ)
        } else {
            DEFAULT_SAMPLE_RATE_HZ
        };
    }

    /// Get the sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Handle for reading the log, usable after the recorder is moved
    pub fn log(&self) -> TelemetryLog {
        self.log.clone()
    }

    /// Record a state if it is new and the sample interval has passed
    ///
    /// Returns whether an entry was added. The interval is measured on the
    /// states' capture times, not on wall time.
    pub fn record(&mut self, state: &VehicleState) -> bool {
        if state.is_sentinel() || state.sequence == self.last_sequence {
            return false;
        }

        let min_interval = Duration::from_secs_f64(1.0 / self.sample_rate);
        if let Some(last) = self.last_sample {
            if state.captured_at.saturating_sub(last) < min_interval {
                return false;
            }
        }

        self.log.push(LogEntry::new(*state));
        self.last_sample = Some(state.captured_at);
        self.last_sequence = state.sequence;
        true
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TelemetryRecorder {
    fn open(&mut self) -> Result<(), RenderError> {
        match self.inner.as_mut() {
            Some(inner) => inner.open(),
            None => Ok(()),
        }
    }

    fn render(&mut self, state: &VehicleState) {
        self.record(state);
        if let Some(inner) = self.inner.as_mut() {
            inner.render(state);
        }
    }

    fn close(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.close();
        }
        tracing::debug!(
            entries = self.log.len(),
            dropped = self.log.dropped(),
            "Telemetry recorder closed"
        );
    }
}
