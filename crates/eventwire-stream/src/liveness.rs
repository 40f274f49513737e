//! Last-seen timestamp shared by the receiver and the heartbeat monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Lock-free record of when the last frame arrived.
///
/// Stored as milliseconds since a fixed monotonic origin so a single atomic
/// word is enough.
#[derive(Debug)]
pub struct LivenessClock {
    origin: Instant,
    last_seen_ms: AtomicU64,
}

impl LivenessClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Record that a frame (heartbeat or data) was just read.
    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Release);
    }

    /// Time elapsed since the last [`touch`](Self::touch) (or construction).
    pub fn silent_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_seen_ms.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn touch_resets_silence() {
        let clock = LivenessClock::new();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(clock.silent_for() >= Duration::from_millis(30));
        clock.touch();
        assert!(clock.silent_for() < Duration::from_millis(30));
    }
}
