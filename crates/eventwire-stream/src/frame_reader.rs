//! `FrameReader`: splits a raw byte stream into frames.
//!
//! Two strategies are supported, see [`Framing`]. The reader only finds
//! frame boundaries; typed decoding happens in the producer.

use crate::config::{Framing, ProducerConfig};
use bytes::{Bytes, BytesMut};
use eventwire_core::{
    error::{ErrorClass, StreamError},
    event::Frame,
};
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

/// Frame terminator under [`Framing::Delimited`].
pub const DELIMITER: u8 = 0x00;

/// Why a frame was read off the wire but not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The declared size exceeded the configured frame limit.
    OverLimit,
    /// A buffer of the declared size could not be allocated.
    AllocationFailed,
    /// A delimited frame with no payload bytes.
    Empty,
}

impl SkipReason {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AllocationFailed => ErrorClass::ResourceExhausted,
            Self::OverLimit | Self::Empty => ErrorClass::RecoverableDecode,
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverLimit => write!(f, "over-limit"),
            Self::AllocationFailed => write!(f, "allocation-failed"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// One successful step of the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A non-empty payload ready for decoding.
    Frame(Frame),
    /// A zero-length frame under length-prefixed framing.
    Heartbeat,
    /// A frame whose bytes were consumed and discarded.
    Skipped { len: usize, reason: SkipReason },
}

/// Reads frames from any async byte source.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    framing: Framing,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, config: &ProducerConfig) -> Self {
        Self {
            inner: BufReader::with_capacity(config.read_buffer.max(1), stream),
            framing: config.framing,
            max_frame_len: config.max_frame_len,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Read the next frame.
    ///
    /// Every `Err` is fatal: the stream is unusable afterwards.
    pub async fn next_frame(&mut self) -> Result<FrameEvent, StreamError> {
        match self.framing {
            Framing::LengthPrefixed => self.next_length_prefixed().await,
            Framing::Delimited => self.next_delimited().await,
        }
    }

    async fn next_length_prefixed(&mut self) -> Result<FrameEvent, StreamError> {
        let declared = match self.inner.read_i32().await {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(StreamError::Eof),
            Err(e) => return Err(e.into()),
        };

        if declared < 0 {
            return Err(StreamError::NegativeLength { len: declared });
        }
        if declared == 0 {
            return Ok(FrameEvent::Heartbeat);
        }

        let len = declared as usize;
        if len > self.max_frame_len {
            warn!(len, max = self.max_frame_len, "frame exceeds limit, skipping");
            self.skip(len).await?;
            return Ok(FrameEvent::Skipped {
                len,
                reason: SkipReason::OverLimit,
            });
        }

        let mut buf = Vec::new();
        if let Err(e) = buf.try_reserve_exact(len) {
            warn!(len, error = %e, "cannot allocate frame buffer, skipping");
            self.skip(len).await?;
            return Ok(FrameEvent::Skipped {
                len,
                reason: SkipReason::AllocationFailed,
            });
        }
        buf.resize(len, 0);

        let mut filled = 0;
        while filled < len {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(StreamError::TruncatedFrame {
                    pending: len - filled,
                });
            }
            filled += n;
        }

        Ok(FrameEvent::Frame(Frame::new(buf)))
    }

    /// Consume and discard exactly `count` bytes, tolerating short reads.
    async fn skip(&mut self, count: usize) -> Result<(), StreamError> {
        let mut limited = (&mut self.inner).take(count as u64);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if (skipped as usize) < count {
            return Err(StreamError::TruncatedFrame {
                pending: count - skipped as usize,
            });
        }
        debug!(count, "resynchronized after skipped frame");
        Ok(())
    }

    async fn next_delimited(&mut self) -> Result<FrameEvent, StreamError> {
        let mut frame = BytesMut::new();
        // Bytes thrown away once the current frame went over the limit.
        let mut discarded: Option<usize> = None;

        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    let pending = frame.len() + discarded.unwrap_or(0);
                    return Err(if pending == 0 {
                        StreamError::Eof
                    } else {
                        StreamError::TruncatedFrame { pending }
                    });
                }

                let boundary = available.iter().position(|b| *b == DELIMITER);
                let chunk = &available[..boundary.unwrap_or(available.len())];

                match discarded {
                    Some(ref mut dropped) => *dropped += chunk.len(),
                    None if frame.len() + chunk.len() > self.max_frame_len => {
                        warn!(max = self.max_frame_len, "delimited frame exceeds limit, discarding");
                        discarded = Some(frame.len() + chunk.len());
                        frame.clear();
                    }
                    None => frame.extend_from_slice(chunk),
                }

                match boundary {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(consumed);

            if done {
                break;
            }
        }

        if let Some(len) = discarded {
            return Ok(FrameEvent::Skipped {
                len,
                reason: SkipReason::OverLimit,
            });
        }
        if frame.is_empty() {
            debug!("empty delimited frame");
            return Ok(FrameEvent::Skipped {
                len: 0,
                reason: SkipReason::Empty,
            });
        }
        Ok(FrameEvent::Frame(Frame::new(Bytes::from(frame))))
    }
}
