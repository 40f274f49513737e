//! Ingestion metrics.
//!
//! All instruments use OpenTelemetry conventions and can be exported by
//! whichever meter provider the application installs.

use eventwire_core::stats::{ProducerStats, SinkStats};
use opentelemetry::{
    metrics::{Counter, Meter},
    KeyValue,
};

#[derive(Clone)]
pub struct IngestMetrics {
    pub frames_received: Counter<u64>,
    pub heartbeats: Counter<u64>,
    pub events_emitted: Counter<u64>,
    pub decode_errors: Counter<u64>,
    pub security_violations: Counter<u64>,
    pub frames_skipped: Counter<u64>,
    pub sink_evictions: Counter<u64>,
}

impl IngestMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            frames_received: meter
                .u64_counter("eventwire.frames_received")
                .with_description("Frames read off the wire, heartbeats included")
                .build(),
            heartbeats: meter
                .u64_counter("eventwire.heartbeats")
                .with_description("Zero-length heartbeat frames received")
                .build(),
            events_emitted: meter
                .u64_counter("eventwire.events_emitted")
                .with_description("Decoded events handed to a sink")
                .build(),
            decode_errors: meter
                .u64_counter("eventwire.decode_errors")
                .with_description("Frames dropped because they could not be decoded")
                .build(),
            security_violations: meter
                .u64_counter("eventwire.security_violations")
                .with_description("Payloads rejected for declaring a type outside the allow-list")
                .build(),
            frames_skipped: meter
                .u64_counter("eventwire.frames_skipped")
                .with_description("Frames discarded unread: oversized, unallocatable or empty")
                .build(),
            sink_evictions: meter
                .u64_counter("eventwire.sink_evictions")
                .with_description("Buffered events evicted to make room for newer ones")
                .build(),
        }
    }

    /// Record the counter growth of one producer (or a receiver's total).
    pub fn record_producer(&self, source: &str, delta: &ProducerStats) {
        let attrs = [KeyValue::new("source", source.to_string())];
        let pairs = [
            (&self.frames_received, delta.frames_received),
            (&self.heartbeats, delta.heartbeats),
            (&self.events_emitted, delta.events_emitted),
            (&self.decode_errors, delta.decode_errors),
            (&self.security_violations, delta.security_violations),
            (&self.frames_skipped, delta.frames_skipped),
        ];
        for (counter, value) in pairs {
            if value > 0 {
                counter.add(value, &attrs);
            }
        }
    }

    pub fn record_sink(&self, delta: &SinkStats) {
        if delta.evicted > 0 {
            self.sink_evictions.add(delta.evicted, &[]);
        }
    }
}
