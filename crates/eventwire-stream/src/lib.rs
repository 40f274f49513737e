//! # eventwire-stream
//!
//! Streaming ingestion engine for Eventwire.
//!
//! Reads framed payloads from long-lived byte streams (TCP sockets, process
//! pipes, any `AsyncRead`), decodes each frame into a typed event, tags it
//! with the stream's identity and a per-stream sequence number, and hands it
//! to an `EventSink`. A terminal sentinel marks the end of every stream that
//! produced at least one event.
//!
//! ## Architecture
//! ```text
//! AsyncRead (TCP connection, child stdout, ...)
//!       │
//!       ▼
//! FrameReader (length-prefixed | zero-delimited)
//!       │              │
//!       │              └── heartbeat ──▶ LivenessClock ◀── HeartbeatMonitor
//!       ▼
//! Decoder<T>::decode
//!       │
//!       ▼
//! SourceIdentifierUpdater ──▶ EventWrapper { source, local_id, event }
//!       │
//!       ▼
//! EventSink<T>::add                      ← shared by many producers
//! ```

pub mod config;
pub mod frame_reader;
pub mod frame_writer;
pub mod handle;
pub mod heartbeat;
pub mod liveness;
pub mod process;
pub mod producer;
pub mod tcp;

pub use config::{Framing, ProducerConfig};
pub use frame_reader::{FrameEvent, FrameReader, SkipReason};
pub use frame_writer::{encode_delimited, encode_length_prefixed, FrameWriter};
pub use handle::StreamHandle;
pub use heartbeat::{HeartbeatMonitor, MonitorExit};
pub use liveness::LivenessClock;
pub use process::{spawn_process_producer, ProcessProducer};
pub use producer::{EventProducer, ProducerState};
pub use tcp::TcpEventReceiver;
