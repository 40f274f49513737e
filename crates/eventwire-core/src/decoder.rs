//! The `Decoder` and `SourceIdentifierUpdater` traits plus stock
//! implementations.
//!
//! Decoders turn one frame payload into a typed event. They are object-safe
//! so producers can hold them as `Arc<dyn Decoder<T>>` and share one decoder
//! across every connection accepted by a receiver.

use crate::error::DecodeError;
use crate::source::SourceIdentifier;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Converts a frame's raw bytes into a typed event.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance is shared by every
/// producer it is registered with.
pub trait Decoder<T>: Send + Sync {
    /// Decode one frame payload. Failures are non-fatal to the stream.
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError>;

    /// Short name of the content type this decoder handles, used in logs.
    fn content_type(&self) -> &str {
        "application/octet-stream"
    }
}

/// Blanket impl so closures can be used as decoders.
impl<T, F> Decoder<T> for F
where
    F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        self(bytes)
    }
}

/// Best-effort hook that refines a stream's identity from decoded events.
pub trait SourceIdentifierUpdater<T>: Send + Sync {
    fn update(&self, source: &mut SourceIdentifier, event: &T);
}

impl<T, F> SourceIdentifierUpdater<T> for F
where
    F: Fn(&mut SourceIdentifier, &T) + Send + Sync,
{
    fn update(&self, source: &mut SourceIdentifier, event: &T) {
        self(source, event)
    }
}

/// Decodes JSON payloads into any `DeserializeOwned` type.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

/// Decodes payloads as UTF-8 text. Invalid UTF-8 is rejected, not replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

impl Decoder<String> for Utf8Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    fn content_type(&self) -> &str {
        "text/plain"
    }
}

/// Sets the secondary identifier from a string found at a JSON pointer
/// (RFC 6901) inside `serde_json::Value` events.
///
/// Events without a string at the pointer leave the identifier untouched.
#[derive(Debug, Clone)]
pub struct JsonPointerUpdater {
    pointer: String,
}

impl JsonPointerUpdater {
    /// `pointer` uses JSON pointer syntax, e.g. `"/context/applicationId"`.
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }
}

impl SourceIdentifierUpdater<serde_json::Value> for JsonPointerUpdater {
    fn update(&self, source: &mut SourceIdentifier, event: &serde_json::Value) {
        if let Some(found) = event.pointer(&self.pointer).and_then(|v| v.as_str()) {
            source.set_secondary(found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct LogLine {
        level: String,
        message: String,
    }

    #[test]
    fn json_decoder_decodes_struct() {
        let decoder = JsonDecoder::<LogLine>::new();
        let line = decoder
            .decode(br#"{"level":"INFO","message":"up"}"#)
            .unwrap();
        assert_eq!(line.level, "INFO");
        assert_eq!(decoder.content_type(), "application/json");
    }

    #[test]
    fn json_decoder_rejects_garbage() {
        let decoder = JsonDecoder::<LogLine>::new();
        assert!(matches!(decoder.decode(b"{nope"), Err(DecodeError::Serde(_))));
    }

    #[test]
    fn utf8_decoder_rejects_invalid_bytes() {
        assert_eq!(Utf8Decoder.decode(b"hello").unwrap(), "hello");
        assert!(matches!(
            Utf8Decoder.decode(&[0xff, 0xfe]),
            Err(DecodeError::Utf8(_))
        ));
    }

    #[test]
    fn closure_decoder() {
        let decoder = |bytes: &[u8]| -> Result<usize, DecodeError> { Ok(bytes.len()) };
        assert_eq!(<_ as Decoder<usize>>::decode(&decoder, b"abc").unwrap(), 3);
    }

    #[test]
    fn pointer_updater_sets_secondary() {
        let updater = JsonPointerUpdater::new("/ctx/app");
        let mut id = SourceIdentifier::new("10.1.1.1");
        updater.update(&mut id, &json!({"ctx": {"app": "billing-7"}}));
        assert_eq!(id.secondary(), Some("billing-7"));

        // Missing pointer leaves the previous value in place.
        updater.update(&mut id, &json!({"ctx": {}}));
        assert_eq!(id.secondary(), Some("billing-7"));
    }

    #[test]
    fn closure_updater() {
        let updater = |id: &mut SourceIdentifier, ev: &String| {
            id.set_secondary(ev.clone());
        };
        let mut id = SourceIdentifier::new("p");
        updater.update(&mut id, &"s".to_string());
        assert_eq!(id.secondary(), Some("s"));
    }
}
