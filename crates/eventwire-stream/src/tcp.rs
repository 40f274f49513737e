//! `TcpEventReceiver`: accepts TCP connections and runs one producer each.
//!
//! Every accepted peer gets its own [`EventProducer`] whose primary source
//! identifier is the peer's IP address. Decoder, updater and sink are shared
//! by all of them.
//!
//! # Usage
//! ```no_run
//! # async fn example(sink: std::sync::Arc<dyn eventwire_core::EventSink<serde_json::Value>>) -> std::io::Result<()> {
//! use eventwire_core::JsonDecoder;
//! use eventwire_stream::{ProducerConfig, TcpEventReceiver};
//! use std::{sync::Arc, time::Duration};
//!
//! let receiver = Arc::new(
//!     TcpEventReceiver::bind(
//!         "127.0.0.1:7400",
//!         ProducerConfig::length_prefixed(Some(Duration::from_secs(5))),
//!         Arc::new(JsonDecoder::<serde_json::Value>::new()),
//!         sink,
//!     )
//!     .await?,
//! );
//! tokio::spawn(Arc::clone(&receiver).run());
//! // ...
//! receiver.shutdown();
//! # Ok(())
//! # }
//! ```

use crate::config::ProducerConfig;
use crate::handle::StreamHandle;
use crate::producer::{EventProducer, ProducerState};
use eventwire_core::{
    decoder::{Decoder, SourceIdentifierUpdater},
    sink::EventSink,
    source::SourceIdentifier,
    stats::ProducerStats,
};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct TcpEventReceiver<T> {
    listener: TcpListener,
    config: ProducerConfig,
    decoder: Arc<dyn Decoder<T>>,
    updater: Option<Arc<dyn SourceIdentifierUpdater<T>>>,
    sink: Arc<dyn EventSink<T>>,
    shutdown: StreamHandle,
    producers: Mutex<Vec<Arc<EventProducer<T>>>>,
    /// Counters of producers that finished and were pruned.
    retired: Mutex<ProducerStats>,
    accepted: AtomicU64,
}

impl<T: Send + 'static> TcpEventReceiver<T> {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: ProducerConfig,
        decoder: Arc<dyn Decoder<T>>,
        sink: Arc<dyn EventSink<T>>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, framing = ?config.framing, "TCP receiver listening");
        Ok(Self {
            listener,
            config,
            decoder,
            updater: None,
            sink,
            shutdown: StreamHandle::new(),
            producers: Mutex::new(Vec::new()),
            retired: Mutex::new(ProducerStats::default()),
            accepted: AtomicU64::new(0),
        })
    }

    /// Updater installed on every producer created from now on.
    pub fn with_updater(mut self, updater: Arc<dyn SourceIdentifierUpdater<T>>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called, then
    /// close every live producer and wait for them to finish.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.closed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_producer(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        let live = std::mem::take(&mut *self.producers.lock().unwrap());
        info!(live = live.len(), "TCP receiver shutting down");
        for producer in &live {
            producer.close();
        }
        for producer in live {
            producer.join().await;
            self.retired.lock().unwrap().merge(&producer.stats());
        }
    }

    fn spawn_producer(&self, stream: TcpStream, peer: SocketAddr) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.prune();

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "could not set TCP_NODELAY");
        }

        let source = SourceIdentifier::new(peer.ip().to_string());
        let mut producer = EventProducer::new(
            stream,
            source,
            self.config.clone(),
            Arc::clone(&self.decoder),
            Arc::clone(&self.sink),
        );
        if let Some(updater) = &self.updater {
            producer = producer.with_updater(Arc::clone(updater));
        }

        match producer.start() {
            Ok(()) => {
                debug!(peer = %peer, "connection accepted");
                self.producers.lock().unwrap().push(Arc::new(producer));
            }
            Err(e) => error!(peer = %peer, error = %e, "failed to start producer"),
        }
    }

    /// Drop finished producers, keeping their counters.
    fn prune(&self) {
        let mut producers = self.producers.lock().unwrap();
        let mut retired = self.retired.lock().unwrap();
        producers.retain(|p| {
            if p.state() == ProducerState::Closed {
                retired.merge(&p.stats());
                false
            } else {
                true
            }
        });
    }

    /// Stop accepting. Returns `false` if shutdown was already requested.
    pub fn shutdown(&self) -> bool {
        self.shutdown.close()
    }

    /// Number of producers that have not reached `Closed` yet.
    pub fn active_producers(&self) -> usize {
        self.producers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.state() != ProducerState::Closed)
            .count()
    }

    pub fn connections_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Counters summed over every producer this receiver has run.
    pub fn stats(&self) -> ProducerStats {
        let mut total = self.retired.lock().unwrap().clone();
        for producer in self.producers.lock().unwrap().iter() {
            total.merge(&producer.stats());
        }
        total
    }
}
