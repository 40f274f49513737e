//! `StreamHandle`: the open/closed state of one stream.
//!
//! Closing is a one-shot, race-free transition: whichever caller wins the
//! compare-exchange performs the release and broadcasts the shutdown; every
//! other caller observes a no-op. Tasks blocked on the stream race their
//! reads against [`StreamHandle::closed`] and exit once it resolves.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

pub struct StreamHandle {
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl StreamHandle {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Close the handle. Returns `true` only for the caller that actually
    /// performed the transition.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.shutdown.send_replace(true);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the handle has been closed (immediately if it already is).
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn second_close_is_noop() {
        let h = StreamHandle::new();
        assert!(h.close());
        assert!(!h.close());
        assert!(h.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_close_has_one_winner() {
        for _ in 0..50 {
            let h = Arc::new(StreamHandle::new());
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let h = Arc::clone(&h);
                    tokio::spawn(async move { h.close() })
                })
                .collect();
            let mut winners = 0;
            for t in tasks {
                if t.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test]
    async fn closed_resolves_for_late_and_early_waiters() {
        let h = Arc::new(StreamHandle::new());
        let waiter = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.closed().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("early waiter not woken")
            .unwrap();
        // Already closed: resolves at once.
        tokio::time::timeout(Duration::from_millis(100), h.closed())
            .await
            .expect("late waiter blocked");
    }
}
