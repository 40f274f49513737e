//! # eventwire-core
//!
//! Core traits, types, and primitives shared across all Eventwire crates.
//! The framing readers, the whitelist guard, the producers and the sinks are
//! all built on top of the interfaces defined here.

pub mod decoder;
pub mod error;
pub mod event;
pub mod sink;
pub mod source;
pub mod stats;

pub use decoder::{Decoder, JsonDecoder, JsonPointerUpdater, SourceIdentifierUpdater, Utf8Decoder};
pub use error::{DecodeError, ErrorClass, ProducerError, SecurityViolation, StreamError};
pub use event::{EventWrapper, Frame};
pub use sink::EventSink;
pub use source::SourceIdentifier;
pub use stats::{ProducerStats, SinkStats};
