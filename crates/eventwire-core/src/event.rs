//! Wire frames and wrapped output events.

use crate::source::SourceIdentifier;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One self-delimited chunk of bytes extracted from the raw stream,
/// before typed decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Under length-prefixed framing an empty frame is a heartbeat.
    pub fn is_heartbeat(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// One unit of engine output.
///
/// `event == None` is the terminal sentinel: the producer that emitted it is
/// gone and will emit nothing further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWrapper<T> {
    /// Identity of the stream at emission time.
    pub source: SourceIdentifier,
    /// Per-producer sequence number. Real events start at 1.
    pub local_id: u64,
    pub event: Option<T>,
}

impl<T> EventWrapper<T> {
    pub fn new(source: SourceIdentifier, local_id: u64, event: T) -> Self {
        Self {
            source,
            local_id,
            event: Some(event),
        }
    }

    /// Build the terminal sentinel for a producer.
    pub fn sentinel(source: SourceIdentifier, local_id: u64) -> Self {
        Self {
            source,
            local_id,
            event: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.event.is_none()
    }

    pub fn event(&self) -> Option<&T> {
        self.event.as_ref()
    }

    /// Map the carried event, keeping source and sequence number.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EventWrapper<U> {
        EventWrapper {
            source: self.source,
            local_id: self.local_id,
            event: self.event.map(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_heartbeat() {
        assert!(Frame::new(Bytes::new()).is_heartbeat());
        assert!(!Frame::new(vec![1u8, 2, 3]).is_heartbeat());
    }

    #[test]
    fn wrapper_keeps_snapshot_of_source() {
        let mut id = SourceIdentifier::new("127.0.0.1");
        let wrapper = EventWrapper::new(id.clone(), 1, "hello");
        id.set_secondary("later");
        assert_eq!(wrapper.source.secondary(), None);
        assert!(!wrapper.is_sentinel());
    }

    #[test]
    fn sentinel_has_no_event() {
        let s: EventWrapper<String> = EventWrapper::sentinel(SourceIdentifier::new("x"), 4);
        assert!(s.is_sentinel());
        assert_eq!(s.map(|e| e.len()).event, None);
    }
}
