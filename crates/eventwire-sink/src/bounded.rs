//! `BoundedEventSink`: an in-memory, capacity-limited event buffer.
//!
//! Producers push through [`EventSink::add`]; consumers pull with
//! [`drain`](BoundedEventSink::drain) and friends. When full, the oldest
//! entry is evicted so a slow consumer never stalls ingestion for long.

use crate::config::{SinkConfig, SourceFilter};
use async_trait::async_trait;
use eventwire_core::{event::EventWrapper, sink::EventSink, stats::SinkStats};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

pub struct BoundedEventSink<T> {
    queue: Mutex<VecDeque<EventWrapper<T>>>,
    capacity: usize,
    congestion_delay: Duration,
    filter: RwLock<SourceFilter>,
    admissions: Notify,
    admitted: AtomicU64,
    filtered: AtomicU64,
    evicted: AtomicU64,
}

impl<T> BoundedEventSink<T> {
    pub fn new(config: SinkConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity,
            congestion_delay: config.congestion_delay(),
            filter: RwLock::new(config.filter),
            admissions: Notify::new(),
            admitted: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(SinkConfig::with_capacity(capacity))
    }

    /// Remove and return everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<EventWrapper<T>> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    /// Remove and return at most `max` entries, oldest first.
    pub fn drain_up_to(&self, max: usize) -> Vec<EventWrapper<T>> {
        let mut queue = self.queue.lock().unwrap();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard everything buffered. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let n = queue.len();
        queue.clear();
        n
    }

    /// Replace the filter. Applies to wrappers added from now on.
    pub fn set_filter(&self, filter: SourceFilter) {
        debug!(?filter, "sink filter updated");
        *self.filter.write().unwrap() = filter;
    }

    pub fn filter(&self) -> SourceFilter {
        self.filter.read().unwrap().clone()
    }

    /// Resolve once at least one wrapper is buffered.
    pub async fn wait_for_events(&self) {
        loop {
            let admitted = self.admissions.notified();
            if !self.is_empty() {
                return;
            }
            admitted.await;
        }
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> BoundedEventSink<T> {
    /// Copy of the buffered entries without removing them.
    pub fn snapshot(&self) -> Vec<EventWrapper<T>> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }
}

impl<T> Default for BoundedEventSink<T> {
    fn default() -> Self {
        Self::new(SinkConfig::default())
    }
}

#[async_trait]
impl<T: Send + 'static> EventSink<T> for BoundedEventSink<T> {
    async fn add(&self, wrapper: EventWrapper<T>) {
        let admit = wrapper.is_sentinel() || self.filter.read().unwrap().admits(wrapper.source.primary());
        if !admit {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            trace!(source = %wrapper.source, local_id = wrapper.local_id, "event filtered");
            return;
        }

        let evicted = {
            let mut queue = self.queue.lock().unwrap();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(wrapper);
            evicted
        };
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.admissions.notify_waiters();

        if let Some(old) = evicted {
            let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(source = %old.source, local_id = old.local_id, total, "sink full, evicted oldest entry");
            if !self.congestion_delay.is_zero() {
                tokio::time::sleep(self.congestion_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventwire_core::source::SourceIdentifier;
    use std::sync::Arc;
    use std::time::Instant;

    fn event(primary: &str, id: u64) -> EventWrapper<u64> {
        EventWrapper::new(SourceIdentifier::new(primary), id, id * 10)
    }

    fn sentinel(primary: &str, id: u64) -> EventWrapper<u64> {
        EventWrapper::sentinel(SourceIdentifier::new(primary), id)
    }

    #[tokio::test]
    async fn overflow_evicts_oldest() {
        let sink = BoundedEventSink::with_capacity(3);
        for id in 1..=5 {
            sink.add(event("a", id)).await;
        }
        let ids: Vec<_> = sink.drain().into_iter().map(|w| w.local_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);

        let stats = sink.stats();
        assert_eq!(stats.admitted, 5);
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.len, 0);
    }

    #[tokio::test]
    async fn deny_list_drops_events_but_admits_sentinel() {
        let sink = BoundedEventSink::new(SinkConfig::default().with_filter(SourceFilter::deny(["x"])));
        sink.add(event("x", 1)).await;
        sink.add(event("y", 1)).await;
        sink.add(sentinel("x", 2)).await;

        let got = sink.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].source.primary(), "y");
        assert!(got[1].is_sentinel());
        assert_eq!(got[1].source.primary(), "x");
        assert_eq!(sink.stats().filtered, 1);
    }

    #[tokio::test]
    async fn allow_list_admits_only_listed_sources() {
        let sink = BoundedEventSink::new(SinkConfig::default().with_filter(SourceFilter::allow(["a"])));
        sink.add_all(vec![event("a", 1), event("b", 1), event("a", 2)]).await;
        assert_eq!(sink.len(), 2);

        sink.set_filter(SourceFilter::None);
        sink.add(event("b", 2)).await;
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.filter(), SourceFilter::None);
    }

    #[tokio::test]
    async fn congestion_delay_is_bounded() {
        let config = SinkConfig::with_capacity(1).with_congestion_delay(Duration::from_millis(20));
        let sink = BoundedEventSink::new(config);
        sink.add(event("a", 1)).await;

        let started = Instant::now();
        sink.add(event("a", 2)).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(1));
        assert_eq!(sink.snapshot()[0].local_id, 2);
    }

    #[tokio::test]
    async fn drain_up_to_and_clear() {
        let sink = BoundedEventSink::with_capacity(10);
        for id in 1..=4 {
            sink.add(event("a", id)).await;
        }
        let first: Vec<_> = sink.drain_up_to(3).into_iter().map(|w| w.local_id).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(sink.drain_up_to(10).len(), 1);

        sink.add(event("a", 5)).await;
        assert_eq!(sink.clear(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let sink: BoundedEventSink<u64> = BoundedEventSink::with_capacity(0);
        assert_eq!(sink.capacity(), 1);
    }

    #[tokio::test]
    async fn wait_for_events_wakes_on_admission() {
        let sink = Arc::new(BoundedEventSink::with_capacity(4));
        let waiter = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.wait_for_events().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.add(event("a", 1)).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
