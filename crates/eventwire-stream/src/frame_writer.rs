//! `FrameWriter`: the sending side of both framings.
//!
//! Used by peers feeding an Eventwire receiver, by the demos and by tests.

use crate::config::Framing;
use crate::frame_reader::DELIMITER;
use crate::handle::StreamHandle;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Encode one length-prefixed frame. An empty payload encodes a heartbeat.
pub fn encode_length_prefixed(payload: &[u8]) -> io::Result<Bytes> {
    let len = i32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit an i32 length", payload.len()),
        )
    })?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_i32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Encode one zero-delimited frame. The payload must not contain the delimiter.
pub fn encode_delimited(payload: &[u8]) -> io::Result<Bytes> {
    if payload.contains(&DELIMITER) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "payload contains the frame delimiter",
        ));
    }
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_slice(payload);
    buf.put_u8(DELIMITER);
    Ok(buf.freeze())
}

/// Writes frames to any async sink of bytes.
pub struct FrameWriter<W> {
    inner: W,
    framing: Framing,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, framing: Framing) -> Self {
        Self { inner, framing }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        let encoded = match self.framing {
            Framing::LengthPrefixed => encode_length_prefixed(payload)?,
            Framing::Delimited => encode_delimited(payload)?,
        };
        self.inner.write_all(&encoded).await
    }

    /// Write a zero-length frame. Only meaningful for length-prefixed framing.
    pub async fn write_heartbeat(&mut self) -> io::Result<()> {
        match self.framing {
            Framing::LengthPrefixed => self.inner.write_all(&0i32.to_be_bytes()).await,
            Framing::Delimited => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "delimited framing has no heartbeat frame",
            )),
        }
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> FrameWriter<W> {
    /// Share the writer with a background task that sends a heartbeat every
    /// `rate` until `stop` is closed or a write fails.
    ///
    /// Data frames go through the returned handle so they never interleave
    /// with a heartbeat mid-frame.
    pub fn with_heartbeats(
        self,
        rate: Duration,
        stop: Arc<StreamHandle>,
    ) -> (Arc<Mutex<Self>>, JoinHandle<io::Result<()>>) {
        let writer = Arc::new(Mutex::new(self));
        let task = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(rate);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.closed() => {
                            debug!("heartbeat sender stopped");
                            return Ok(());
                        }
                        _ = ticker.tick() => {
                            let mut w = writer.lock().await;
                            let sent = match w.write_heartbeat().await {
                                Ok(()) => w.flush().await,
                                Err(e) => Err(e),
                            };
                            if let Err(e) = sent {
                                warn!(error = %e, "heartbeat write failed");
                                return Err(e);
                            }
                        }
                    }
                }
            })
        };
        (writer, task)
    }
}
