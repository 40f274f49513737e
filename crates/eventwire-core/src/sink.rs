//! The `EventSink` trait: the terminal consumer of producer output.

use crate::event::EventWrapper;
use async_trait::async_trait;

/// Append-only consumer of wrapped events.
///
/// A sink may be shared by many producers; implementations must tolerate
/// interleaved `add` calls from concurrent tasks.
#[async_trait]
pub trait EventSink<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Offer one wrapper to the sink.
    async fn add(&self, wrapper: EventWrapper<T>);

    /// Offer a batch. Equivalent to calling `add` for each wrapper in order.
    async fn add_all(&self, wrappers: Vec<EventWrapper<T>>) {
        for wrapper in wrappers {
            self.add(wrapper).await;
        }
    }
}
