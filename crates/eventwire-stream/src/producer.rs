//! `EventProducer`: binds one byte stream to a decoder and a sink.
//!
//! A producer owns up to two background tasks:
//!
//! - the **receiver**, which reads frames, decodes them, stamps each event
//!   with the stream's identity and the next sequence number, and hands it
//!   to the sink;
//! - the **heartbeat monitor** (length-prefixed framing with a rate only),
//!   which closes the stream once the peer has been silent for two rates.
//!
//! When the receiver stops, for whatever reason, it emits exactly one
//! sentinel wrapper (`event == None`) unless no real event was ever emitted.

use crate::config::ProducerConfig;
use crate::frame_reader::{FrameEvent, FrameReader};
use crate::handle::StreamHandle;
use crate::heartbeat::{HeartbeatMonitor, MonitorExit};
use crate::liveness::LivenessClock;
use eventwire_core::{
    decoder::{Decoder, SourceIdentifierUpdater},
    error::{DecodeError, ErrorClass, ProducerError, StreamError},
    event::{EventWrapper, Frame},
    sink::EventSink,
    source::SourceIdentifier,
    stats::ProducerStats,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Number of payload bytes included (hex-encoded) in undecodable-frame logs.
const LOG_PAYLOAD_PREFIX: usize = 32;

type BoxedStream = Box<dyn AsyncRead + Send + Unpin>;

/// Lifecycle of a producer. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Created,
    Running,
    /// The stream is released; the sentinel has not been emitted yet.
    Closing,
    Closed,
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    heartbeats: AtomicU64,
    events_emitted: AtomicU64,
    decode_errors: AtomicU64,
    security_violations: AtomicU64,
    frames_skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ProducerStats {
        ProducerStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            security_violations: self.security_violations.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }
}

/// The stream's identity together with the hook allowed to refine it.
struct Identity<T> {
    source: SourceIdentifier,
    updater: Option<Arc<dyn SourceIdentifierUpdater<T>>>,
}

struct Shared<T> {
    identity: Mutex<Identity<T>>,
    config: ProducerConfig,
    decoder: Arc<dyn Decoder<T>>,
    sink: Arc<dyn EventSink<T>>,
    handle: StreamHandle,
    liveness: LivenessClock,
    state: watch::Sender<ProducerState>,
    counters: Counters,
    /// Silence observed by the monitor, set only if the monitor did the close.
    /// Held across the close so `finish` never reads it half-written.
    timed_out: Mutex<Option<Duration>>,
    /// The transport, parked here until `start()` hands it to the receiver.
    stream: Mutex<Option<BoxedStream>>,
}

impl<T> Shared<T> {
    fn source(&self) -> SourceIdentifier {
        self.identity.lock().unwrap().source.clone()
    }

    /// Close on behalf of the heartbeat monitor. The silence is recorded only
    /// if this call won the close.
    fn close_for_timeout(&self, silent_for: Duration) -> bool {
        let mut timed_out = self.timed_out.lock().unwrap();
        let closed = self.handle.close();
        if closed {
            *timed_out = Some(silent_for);
        }
        closed
    }

    fn advance(&self, from: ProducerState, to: ProducerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

/// Reads events from one stream into a sink.
///
/// # Usage
/// ```no_run
/// # async fn example(sink: std::sync::Arc<dyn eventwire_core::EventSink<String>>) {
/// use eventwire_core::{SourceIdentifier, Utf8Decoder};
/// use eventwire_stream::{EventProducer, ProducerConfig};
/// use std::sync::Arc;
///
/// let (client, server) = tokio::io::duplex(1024);
/// let producer = EventProducer::new(
///     server,
///     SourceIdentifier::new("local"),
///     ProducerConfig::delimited(),
///     Arc::new(Utf8Decoder),
///     sink,
/// );
/// producer.start().unwrap();
/// drop(client);
/// producer.join().await;
/// # }
/// ```
pub struct EventProducer<T> {
    shared: Arc<Shared<T>>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> EventProducer<T> {
    pub fn new<R>(
        stream: R,
        source: SourceIdentifier,
        config: ProducerConfig,
        decoder: Arc<dyn Decoder<T>>,
        sink: Arc<dyn EventSink<T>>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (state, _) = watch::channel(ProducerState::Created);
        let shared = Shared {
            identity: Mutex::new(Identity {
                source,
                updater: None,
            }),
            config,
            decoder,
            sink,
            handle: StreamHandle::new(),
            liveness: LivenessClock::new(),
            state,
            counters: Counters::default(),
            timed_out: Mutex::new(None),
            stream: Mutex::new(Some(Box::new(stream))),
        };
        Self {
            shared: Arc::new(shared),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Install the hook that may refine the source identifier from events.
    pub fn with_updater(self, updater: Arc<dyn SourceIdentifierUpdater<T>>) -> Self {
        self.shared.identity.lock().unwrap().updater = Some(updater);
        self
    }

    /// Spawn the receiver and, if the configuration asks for it, the
    /// heartbeat monitor. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), ProducerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ProducerError::AlreadyStarted);
        }
        if !self.shared.advance(ProducerState::Created, ProducerState::Running) {
            return Err(ProducerError::Closed);
        }
        let stream = match self.shared.stream.lock().unwrap().take() {
            Some(stream) => stream,
            None => return Err(ProducerError::Closed),
        };

        let source = self.shared.source();
        info!(
            source = %source,
            framing = ?self.shared.config.framing,
            decoder = self.shared.decoder.content_type(),
            "producer started"
        );

        self.shared.liveness.touch();
        let mut tasks = self.tasks.lock().unwrap();

        if let Some(rate) = self.shared.config.heartbeat_rate() {
            let shared = Arc::clone(&self.shared);
            tasks.push(tokio::spawn(async move {
                let exit = HeartbeatMonitor::new(rate)
                    .run(&shared.liveness, &shared.handle, |silent_for| {
                        shared.close_for_timeout(silent_for)
                    })
                    .await;
                debug!(source = %shared.source(), ?exit, "heartbeat monitor stopped");
            }));
        }

        let shared = Arc::clone(&self.shared);
        tasks.push(tokio::spawn(receive(shared, stream)));
        Ok(())
    }

    /// Release the stream. Returns `true` only for the call that actually
    /// performed the release; every other call is a no-op.
    ///
    /// Closing a producer that was never started moves it straight to
    /// [`ProducerState::Closed`] without emitting anything.
    pub fn close(&self) -> bool {
        if !self.shared.handle.close() {
            return false;
        }
        if self.shared.advance(ProducerState::Created, ProducerState::Closed) {
            self.shared.stream.lock().unwrap().take();
            info!(source = %self.shared.source(), "producer closed before start");
        } else {
            self.shared.advance(ProducerState::Running, ProducerState::Closing);
        }
        true
    }

    /// Wait for every background task to finish.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "producer task failed");
            }
        }
    }

    /// Resolve once the producer has reached [`ProducerState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        while *rx.borrow_and_update() != ProducerState::Closed {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn state(&self) -> ProducerState {
        *self.shared.state.borrow()
    }

    /// The current source identifier, including any refinement made by the
    /// updater.
    pub fn source(&self) -> SourceIdentifier {
        self.shared.source()
    }

    pub fn stats(&self) -> ProducerStats {
        self.shared.counters.snapshot()
    }
}

impl<T> std::fmt::Debug for EventProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProducer")
            .field("source", &self.shared.source())
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

// ─── Receiver task ────────────────────────────────────────────────────────────

async fn receive<T: Send + 'static>(shared: Arc<Shared<T>>, stream: BoxedStream) {
    let mut reader = FrameReader::new(stream, &shared.config);
    let mut local_id: u64 = 0;

    let cause = loop {
        let next = tokio::select! {
            biased;
            _ = shared.handle.closed() => Err(StreamError::Closed),
            next = reader.next_frame() => next,
        };
        match next {
            Ok(event) => {
                shared.liveness.touch();
                on_frame(&shared, event, &mut local_id).await;
            }
            Err(e) => break e,
        }
    };

    drop(reader);
    finish(&shared, local_id, cause).await;
}

async fn on_frame<T: Send + 'static>(shared: &Shared<T>, event: FrameEvent, local_id: &mut u64) {
    let counters = &shared.counters;
    counters.frames_received.fetch_add(1, Ordering::Relaxed);

    match event {
        FrameEvent::Heartbeat => {
            counters.heartbeats.fetch_add(1, Ordering::Relaxed);
        }
        FrameEvent::Skipped { len, reason } => {
            counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(source = %shared.source(), len, %reason, class = %reason.class(), "frame skipped");
        }
        FrameEvent::Frame(frame) => match decode_isolated(&*shared.decoder, &frame.payload) {
            Ok(event) => emit(shared, event, local_id).await,
            Err(e) => on_decode_error(shared, &frame, e),
        },
    }
}

async fn emit<T: Send + 'static>(shared: &Shared<T>, event: T, local_id: &mut u64) {
    let source = {
        let mut identity = shared.identity.lock().unwrap();
        let Identity { source, updater } = &mut *identity;
        if let Some(updater) = updater {
            let refined = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut candidate = source.clone();
                updater.update(&mut candidate, &event);
                candidate
            }));
            match refined {
                Ok(candidate) => *source = candidate,
                Err(payload) => warn!(
                    source = %source,
                    panic = panic_message(&*payload),
                    "source identifier updater panicked, identity unchanged"
                ),
            }
        }
        source.clone()
    };

    *local_id += 1;
    shared.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
    shared.sink.add(EventWrapper::new(source, *local_id, event)).await;
}

/// Run the decoder with panics turned into per-frame errors.
fn decode_isolated<T>(decoder: &dyn Decoder<T>, payload: &[u8]) -> Result<T, DecodeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(payload))) {
        Ok(result) => result,
        Err(panic) => Err(DecodeError::Other(format!(
            "decoder panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

fn on_decode_error<T>(shared: &Shared<T>, frame: &Frame, e: DecodeError) {
    let counters = &shared.counters;
    match e.class() {
        ErrorClass::SecurityViolation => {
            // The guard reports each offending type once; this is per occurrence.
            counters.security_violations.fetch_add(1, Ordering::Relaxed);
            debug!(source = %shared.source(), error = %e, "payload rejected");
        }
        _ => {
            counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            let prefix = &frame.payload[..frame.len().min(LOG_PAYLOAD_PREFIX)];
            warn!(source = %shared.source(), len = frame.len(), error = %e, "dropping undecodable frame");
            debug!(payload = %hex::encode(prefix), "undecodable payload prefix");
        }
    }
}

async fn finish<T: Send + 'static>(shared: &Shared<T>, local_id: u64, cause: StreamError) {
    shared.handle.close();
    shared.advance(ProducerState::Running, ProducerState::Closing);

    let cause = match cause {
        StreamError::Closed => match *shared.timed_out.lock().unwrap() {
            Some(silent_for) => StreamError::HeartbeatTimeout {
                ms: silent_for.as_millis().max(1) as u64,
            },
            None => StreamError::Closed,
        },
        other => other,
    };

    let source = shared.source();
    match &cause {
        StreamError::Eof | StreamError::Closed => {
            info!(source = %source, cause = %cause, events = local_id, "producer finished")
        }
        _ => warn!(
            source = %source,
            cause = %cause,
            class = %cause.class(),
            events = local_id,
            "producer terminated"
        ),
    }

    if local_id == 0 {
        debug!(source = %source, "no events emitted, sentinel suppressed");
    } else {
        shared.sink.add(EventWrapper::sentinel(source, local_id + 1)).await;
    }
    shared.state.send_replace(ProducerState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eventwire_core::Utf8Decoder;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventWrapper<String>>>);

    #[async_trait]
    impl EventSink<String> for Collect {
        async fn add(&self, wrapper: EventWrapper<String>) {
            self.0.lock().unwrap().push(wrapper);
        }
    }

    fn producer(stream: tokio::io::DuplexStream, sink: Arc<Collect>) -> EventProducer<String> {
        EventProducer::new(
            stream,
            SourceIdentifier::new("test"),
            ProducerConfig::delimited(),
            Arc::new(Utf8Decoder),
            sink,
        )
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (_client, server) = tokio::io::duplex(64);
        let p = producer(server, Arc::new(Collect::default()));
        p.start().unwrap();
        assert!(matches!(p.start(), Err(ProducerError::AlreadyStarted)));
        assert_eq!(p.state(), ProducerState::Running);
        assert!(p.close());
        p.join().await;
        assert_eq!(p.state(), ProducerState::Closed);
    }

    #[tokio::test]
    async fn close_before_start_goes_straight_to_closed() {
        let (_client, server) = tokio::io::duplex(64);
        let sink = Arc::new(Collect::default());
        let p = producer(server, Arc::clone(&sink));
        assert!(p.close());
        assert!(!p.close());
        assert_eq!(p.state(), ProducerState::Closed);
        assert!(matches!(p.start(), Err(ProducerError::Closed)));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_while_running_emits_sentinel() {
        let (mut client, server) = tokio::io::duplex(64);
        let sink = Arc::new(Collect::default());
        let p = producer(server, Arc::clone(&sink));
        p.start().unwrap();

        client.write_all(b"a\0b\0").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while p.stats().events_emitted < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(p.close());
        tokio::time::timeout(Duration::from_secs(1), p.closed())
            .await
            .unwrap();

        let ids: Vec<_> = sink.0.lock().unwrap().iter().map(|w| (w.local_id, w.is_sentinel())).collect();
        assert_eq!(ids, vec![(1, false), (2, false), (3, true)]);
    }

    #[tokio::test]
    async fn undecodable_frames_are_counted_not_emitted() {
        let (mut client, server) = tokio::io::duplex(64);
        let sink = Arc::new(Collect::default());
        let p = producer(server, Arc::clone(&sink));
        p.start().unwrap();

        client.write_all(b"ok\0\xff\xfe\0").await.unwrap();
        drop(client);
        p.join().await;

        let stats = p.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.events_emitted, 1);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn panicking_decoder_only_loses_that_frame() {
        let decoder = |bytes: &[u8]| -> Result<String, DecodeError> {
            if bytes == b"boom" {
                panic!("decoder blew up");
            }
            Utf8Decoder.decode(bytes)
        };
        let (mut client, server) = tokio::io::duplex(64);
        let sink = Arc::new(Collect::default());
        let p = EventProducer::new(
            server,
            SourceIdentifier::new("test"),
            ProducerConfig::delimited(),
            Arc::new(decoder),
            Arc::clone(&sink) as Arc<dyn EventSink<String>>,
        );
        p.start().unwrap();

        client.write_all(b"ok\0boom\0after\0").await.unwrap();
        drop(client);
        tokio::time::timeout(Duration::from_secs(1), p.closed())
            .await
            .unwrap();

        assert_eq!(p.state(), ProducerState::Closed);
        assert_eq!(p.stats().decode_errors, 1);
        let ids: Vec<_> = sink.0.lock().unwrap().iter().map(|w| (w.local_id, w.is_sentinel())).collect();
        assert_eq!(ids, vec![(1, false), (2, false), (3, true)]);
    }

    #[tokio::test]
    async fn panicking_updater_leaves_identity_usable() {
        let updater = |source: &mut SourceIdentifier, event: &String| {
            if event == "boom" {
                source.set_secondary("half-written");
                panic!("updater blew up");
            }
            source.set_secondary(event.clone());
        };
        let (mut client, server) = tokio::io::duplex(64);
        let sink = Arc::new(Collect::default());
        let p = producer(server, Arc::clone(&sink)).with_updater(Arc::new(updater));
        p.start().unwrap();

        client.write_all(b"first\0boom\0").await.unwrap();
        drop(client);
        p.join().await;

        assert_eq!(p.state(), ProducerState::Closed);
        assert_eq!(p.source().secondary(), Some("first"));
        let got = sink.0.lock().unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[1].event.as_deref(), Some("boom"));
        assert_eq!(got[1].source.secondary(), Some("first"));
    }

    #[tokio::test]
    async fn timeout_is_recorded_only_by_the_closing_caller() {
        let (_client, server) = tokio::io::duplex(64);
        let p = producer(server, Arc::new(Collect::default()));
        p.start().unwrap();
        assert!(p.close());
        assert!(!p.shared.close_for_timeout(Duration::from_secs(1)));
        assert!(p.shared.timed_out.lock().unwrap().is_none());
        p.join().await;

        let (_client, server) = tokio::io::duplex(64);
        let p = producer(server, Arc::new(Collect::default()));
        p.start().unwrap();
        assert!(p.shared.close_for_timeout(Duration::from_secs(1)));
        assert!(!p.close());
        assert_eq!(*p.shared.timed_out.lock().unwrap(), Some(Duration::from_secs(1)));
        p.join().await;
    }
}
