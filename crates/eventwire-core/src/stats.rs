//! Counter snapshots exposed by producers and sinks.

use serde::{Deserialize, Serialize};

/// Metrics snapshot for one producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerStats {
    /// Frames read off the wire, heartbeats included.
    pub frames_received: u64,
    pub heartbeats: u64,
    /// Real events handed to the sink (the sentinel is not counted).
    pub events_emitted: u64,
    pub decode_errors: u64,
    pub security_violations: u64,
    /// Frames dropped by the reader: oversized, unallocatable or empty.
    pub frames_skipped: u64,
}

impl ProducerStats {
    /// Counter growth since an earlier snapshot of the same producer.
    pub fn delta_since(&self, earlier: &Self) -> Self {
        Self {
            frames_received: self.frames_received.saturating_sub(earlier.frames_received),
            heartbeats: self.heartbeats.saturating_sub(earlier.heartbeats),
            events_emitted: self.events_emitted.saturating_sub(earlier.events_emitted),
            decode_errors: self.decode_errors.saturating_sub(earlier.decode_errors),
            security_violations: self
                .security_violations
                .saturating_sub(earlier.security_violations),
            frames_skipped: self.frames_skipped.saturating_sub(earlier.frames_skipped),
        }
    }

    /// Add another producer's counters into this one.
    pub fn merge(&mut self, other: &Self) {
        self.frames_received += other.frames_received;
        self.heartbeats += other.heartbeats;
        self.events_emitted += other.events_emitted;
        self.decode_errors += other.decode_errors;
        self.security_violations += other.security_violations;
        self.frames_skipped += other.frames_skipped;
    }
}

/// Metrics snapshot for one sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkStats {
    pub admitted: u64,
    /// Wrappers rejected by the source filter.
    pub filtered: u64,
    /// Entries evicted to make room for newer ones.
    pub evicted: u64,
    pub len: usize,
    pub capacity: usize,
}

impl SinkStats {
    /// Counter growth since an earlier snapshot. `len` and `capacity` are
    /// gauges and are taken from `self`.
    pub fn delta_since(&self, earlier: &Self) -> Self {
        Self {
            admitted: self.admitted.saturating_sub(earlier.admitted),
            filtered: self.filtered.saturating_sub(earlier.filtered),
            evicted: self.evicted.saturating_sub(earlier.evicted),
            len: self.len,
            capacity: self.capacity,
        }
    }
}
