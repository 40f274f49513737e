//! # eventwire-observability
//!
//! OpenTelemetry metrics and `tracing` setup for Eventwire deployments.
//!
//! ## Built-in metrics
//! - `eventwire.frames_received`    : counter, tagged with source
//! - `eventwire.heartbeats`         : counter, tagged with source
//! - `eventwire.events_emitted`     : counter, tagged with source
//! - `eventwire.decode_errors`      : counter, tagged with source
//! - `eventwire.security_violations`: counter, tagged with source
//! - `eventwire.frames_skipped`     : counter, tagged with source
//! - `eventwire.sink_evictions`     : counter
//!
//! Producers and sinks only keep atomic counters; feed their snapshot deltas
//! (`ProducerStats::delta_since`, `SinkStats::delta_since`) into
//! [`IngestMetrics`] on whatever cadence suits the deployment.
//!
//! ## Structured logging
//! [`init_tracing`] installs a text or JSON `tracing-subscriber` with
//! per-component level overrides.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::IngestMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
