//! Shared Telemetry Store
//!
//! Hands the latest [`VehicleState`] from the simulator to any number of
//! readers. A publication is an atomic pointer swap of a complete state, so
//! a reader either sees all of one publication or all of another, never a
//! mix. Readers never block the writer.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::vehicle::VehicleState;

struct Slot {
    latest: ArcSwap<VehicleState>,
    publications: AtomicU64,
}

/// Create a connected writer/reader pair
///
/// Until the first publication every reader gets the sentinel state.
pub fn telemetry_channel() -> (TelemetryWriter, TelemetryReader) {
    let slot = Arc::new(Slot {
        latest: ArcSwap::from_pointee(VehicleState::sentinel()),
        publications: AtomicU64::new(0),
    });
    (
        TelemetryWriter { slot: slot.clone() },
        TelemetryReader { slot },
    )
}

/// The single write side of the store
///
/// Deliberately not `Clone`: exactly one writer exists per store.
pub struct TelemetryWriter {
    slot: Arc<Slot>,
}

impl TelemetryWriter {
    /// Replace the stored state
    pub fn publish(&self, state: VehicleState) {
        self.slot.latest.store(Arc::new(state));
        self.slot.publications.fetch_add(1, Ordering::Release);
    }

    /// Create another reader attached to this store
    pub fn reader(&self) -> TelemetryReader {
        TelemetryReader {
            slot: self.slot.clone(),
        }
    }
}

/// A read side of the store; clone freely
#[derive(Clone)]
pub struct TelemetryReader {
    slot: Arc<Slot>,
}

impl TelemetryReader {
    /// Copy of the most recently published state, or the sentinel
    pub fn snapshot(&self) -> VehicleState {
        **self.slot.latest.load()
    }

    /// Number of publications so far
    pub fn publications(&self) -> u64 {
        self.slot.publications.load(Ordering::Acquire)
    }

    /// Whether anything has been published yet
    pub fn has_data(&self) -> bool {
        self.publications() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_before_publish_is_sentinel() {
        let (_writer, reader) = telemetry_channel();
        let state = reader.snapshot();
        assert!(state.is_sentinel());
        assert!(!state.valid);
        assert!(!reader.has_data());
    }

    #[test]
    fn test_latest_publication_wins() {
        let (writer, reader) = telemetry_channel();
        let mut state = VehicleState::initial(75.0, 25.0);

        for sequence in 1..=3 {
            state.sequence = sequence;
            writer.publish(state);
        }

        assert_eq!(reader.snapshot().sequence, 3);
        assert_eq!(reader.publications(), 3);
        assert_eq!(writer.reader().snapshot(), reader.snapshot());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let (writer, reader) = telemetry_channel();
        writer.publish(VehicleState::initial(75.0, 25.0));

        let mut copy = reader.snapshot();
        copy.speed_kmh = 250.0;
        assert_eq!(reader.snapshot().speed_kmh, 0.0);
    }
}
