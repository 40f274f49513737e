//! Producer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How frame boundaries are found in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// `i32` big-endian length followed by that many payload bytes.
    /// A zero length is a heartbeat.
    LengthPrefixed,
    /// Payload bytes terminated by a single `0x00`.
    Delimited,
}

/// Configuration for one `EventProducer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub framing: Framing,
    /// Minimum rate at which the peer sends heartbeats. When set (and the
    /// framing is length-prefixed) a monitor closes the stream after two
    /// rates without any frame.
    #[serde(default)]
    pub heartbeat_rate_ms: Option<u64>,
    /// Frames declaring more bytes than this are skipped instead of buffered.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Capacity of the buffered reader wrapped around the transport.
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,
}

fn default_max_frame_len() -> usize { 64 * 1024 * 1024 }
fn default_read_buffer() -> usize { 8 * 1024 }

impl ProducerConfig {
    /// Length-prefixed framing, optionally with heartbeat liveness.
    pub fn length_prefixed(heartbeat_rate: Option<Duration>) -> Self {
        Self {
            framing: Framing::LengthPrefixed,
            heartbeat_rate_ms: heartbeat_rate.map(|d| d.as_millis() as u64),
            max_frame_len: default_max_frame_len(),
            read_buffer: default_read_buffer(),
        }
    }

    /// Zero-delimited framing. Liveness relies on transport close detection.
    pub fn delimited() -> Self {
        Self {
            framing: Framing::Delimited,
            heartbeat_rate_ms: None,
            max_frame_len: default_max_frame_len(),
            read_buffer: default_read_buffer(),
        }
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// The heartbeat rate, if this configuration needs a liveness monitor.
    pub fn heartbeat_rate(&self) -> Option<Duration> {
        match self.framing {
            Framing::LengthPrefixed => self
                .heartbeat_rate_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            Framing::Delimited => None,
        }
    }
}
