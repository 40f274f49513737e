//! # eventwire-sink
//!
//! Reference [`EventSink`](eventwire_core::EventSink) implementation: a
//! bounded in-memory buffer shared by any number of producers, with an
//! allow/deny filter on the primary source identifier.

pub mod bounded;
pub mod config;

pub use bounded::BoundedEventSink;
pub use config::{SinkConfig, SourceFilter};
