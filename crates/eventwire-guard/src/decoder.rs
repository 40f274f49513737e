//! `GuardedDecoder`: inspect first, materialize second.

use crate::guard::WhitelistGuard;
use eventwire_core::{decoder::Decoder, error::DecodeError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Decodes self-describing JSON object graphs into `T`, refusing any graph
/// that declares a type outside the guard's allow-list.
///
/// The payload is parsed into an untyped [`Value`] first; nothing of type `T`
/// is constructed until the whole graph has passed the guard.
pub struct GuardedDecoder<T> {
    guard: Arc<WhitelistGuard>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GuardedDecoder<T> {
    pub fn new(guard: Arc<WhitelistGuard>) -> Self {
        Self {
            guard,
            _marker: PhantomData,
        }
    }

    pub fn guard(&self) -> &Arc<WhitelistGuard> {
        &self.guard
    }
}

impl<T: DeserializeOwned> Decoder<T> for GuardedDecoder<T> {
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let graph: Value = serde_json::from_slice(bytes)?;
        self.guard.inspect(&graph)?;
        Ok(serde_json::from_value(graph)?)
    }

    fn content_type(&self) -> &str {
        "application/x-typed-graph+json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllowList, GuardMode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = "@type")]
    enum Payload {
        #[serde(rename = "app.LoggingEvent")]
        Logging {
            message: String,
            #[serde(default)]
            throwable: Option<Box<Payload>>,
        },
        #[serde(rename = "app.ThrowableInfo")]
        Throwable { name: String },
    }

    fn decoder(mode: GuardMode) -> GuardedDecoder<Payload> {
        GuardedDecoder::new(Arc::new(WhitelistGuard::new(
            AllowList::new(["app.LoggingEvent", "app.ThrowableInfo"]),
            mode,
        )))
    }

    #[test]
    fn allowed_payload_materializes() {
        let d = decoder(GuardMode::Enforce);
        let event = d
            .decode(
                br#"{"@type":"app.LoggingEvent","message":"boom",
                     "throwable":{"@type":"app.ThrowableInfo","name":"IOException"}}"#,
            )
            .unwrap();
        assert_eq!(
            event,
            Payload::Logging {
                message: "boom".into(),
                throwable: Some(Box::new(Payload::Throwable {
                    name: "IOException".into()
                })),
            }
        );
    }

    #[test]
    fn disallowed_nested_type_is_rejected_every_time() {
        let d = decoder(GuardMode::Enforce);
        let bytes = br#"{"@type":"app.LoggingEvent","message":"x",
                         "throwable":{"@type":"evil.Gadget","cmd":"rm -rf /"}}"#;
        for _ in 0..3 {
            let err = d.decode(bytes).unwrap_err();
            assert!(err.is_security_violation(), "unexpected error: {err}");
        }
        assert_eq!(d.guard().violations(), 3);
    }

    #[test]
    fn dry_run_decodes_disallowed_type() {
        let guard = Arc::new(WhitelistGuard::new(AllowList::default(), GuardMode::DryRun));
        let d: GuardedDecoder<Value> = GuardedDecoder::new(guard);
        let value = d.decode(br#"{"@type":"evil.Gadget","cmd":"id"}"#).unwrap();
        assert_eq!(value["cmd"], "id");
        assert_eq!(d.guard().reported_types(), vec!["evil.Gadget".to_string()]);
    }

    #[test]
    fn malformed_json_is_a_plain_decode_error() {
        let d = decoder(GuardMode::Enforce);
        let err = d.decode(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::Serde(_)));
    }
}
