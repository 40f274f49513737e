//! `HeartbeatMonitor`: closes a stream whose peer has gone silent.
//!
//! The peer promises at least one frame (a heartbeat if it has nothing else
//! to say) per heartbeat rate `R`. The monitor ticks every `R` and declares
//! the peer dead once nothing has arrived for more than `2R`.

use crate::handle::StreamHandle;
use crate::liveness::LivenessClock;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// No frame for longer than twice the heartbeat rate.
    TimedOut { silent_for: Duration },
    /// The stream was closed by someone else while waiting.
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    rate: Duration,
}

impl HeartbeatMonitor {
    pub fn new(rate: Duration) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> Duration {
        self.rate
    }

    /// Silence longer than this means the peer is dead.
    pub fn timeout(&self) -> Duration {
        self.rate * 2
    }

    /// Tick until the peer goes stale or the handle is closed elsewhere.
    ///
    /// `close` is invoked with the observed silence only when the peer
    /// timed out.
    pub async fn run<F>(self, liveness: &LivenessClock, handle: &StreamHandle, close: F) -> MonitorExit
    where
        F: FnOnce(Duration) -> bool,
    {
        let mut ticker = tokio::time::interval(self.rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = handle.closed() => {
                    debug!("heartbeat monitor interrupted");
                    return MonitorExit::Interrupted;
                }
                _ = ticker.tick() => {
                    let silent_for = liveness.silent_for();
                    if silent_for > self.timeout() {
                        warn!(
                            silent_ms = silent_for.as_millis() as u64,
                            timeout_ms = self.timeout().as_millis() as u64,
                            "peer missed heartbeats, closing stream"
                        );
                        close(silent_for);
                        return MonitorExit::TimedOut { silent_for };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn times_out_after_twice_the_rate() {
        let liveness = LivenessClock::new();
        let handle = StreamHandle::new();
        let started = Instant::now();

        let exit = HeartbeatMonitor::new(Duration::from_millis(20))
            .run(&liveness, &handle, |_| handle.close())
            .await;

        assert!(matches!(exit, MonitorExit::TimedOut { silent_for } if silent_for > Duration::from_millis(40)));
        assert!(handle.is_closed());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn closes_within_one_tick_after_the_deadline() {
        let rate = Duration::from_millis(100);
        let liveness = Arc::new(LivenessClock::new());
        let handle = Arc::new(StreamHandle::new());
        let started = tokio::time::Instant::now();

        let monitor = {
            let liveness = Arc::clone(&liveness);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                HeartbeatMonitor::new(rate)
                    .run(&liveness, &handle, |_| handle.close())
                    .await
            })
        };

        tokio::time::sleep(rate * 2).await;
        assert!(!handle.is_closed(), "closed at or before 2R");

        let exit = monitor.await.unwrap();
        let elapsed = started.elapsed();
        assert!(handle.is_closed());
        assert!(elapsed > rate * 2 && elapsed <= rate * 3, "closed after {elapsed:?}");
        assert!(matches!(exit, MonitorExit::TimedOut { silent_for } if silent_for <= rate * 3));
    }

    #[tokio::test]
    async fn regular_frames_keep_it_alive() {
        let liveness = Arc::new(LivenessClock::new());
        let handle = Arc::new(StreamHandle::new());

        let monitor = {
            let liveness = Arc::clone(&liveness);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                HeartbeatMonitor::new(Duration::from_millis(50))
                    .run(&liveness, &handle, |_| handle.close())
                    .await
            })
        };

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            liveness.touch();
        }
        assert!(!handle.is_closed(), "monitor closed a live stream");

        handle.close();
        let exit = tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, MonitorExit::Interrupted);
    }
}
