//! Error types for the Eventwire ingestion pipeline.
//!
//! Errors are split by how the receiver loop must react to them; see
//! [`ErrorClass`].

use thiserror::Error;

/// How an error affects the stream that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// One frame could not be decoded. The stream continues.
    RecoverableDecode,
    /// A declared frame could not be buffered. The reader resynchronizes.
    ResourceExhausted,
    /// A payload declared a type outside the allow-list. The stream continues.
    SecurityViolation,
    /// The stream is gone. The producer terminates.
    FatalStream,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecoverableDecode => write!(f, "recoverable-decode"),
            Self::ResourceExhausted => write!(f, "resource-exhausted"),
            Self::SecurityViolation => write!(f, "security-violation"),
            Self::FatalStream => write!(f, "fatal-stream"),
        }
    }
}

/// A serialized payload declared a type name that is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("type '{type_name}' is not on the allow-list")]
pub struct SecurityViolation {
    pub type_name: String,
}

impl SecurityViolation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

/// Errors that can occur while decoding a single frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {reason}")]
    Malformed { reason: String },

    #[error("Invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityViolation),

    #[error("{0}")]
    Other(String),
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Security(_) => ErrorClass::SecurityViolation,
            _ => ErrorClass::RecoverableDecode,
        }
    }

    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

/// Fatal, stream-level conditions. Any of these terminates a producer.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream ended")]
    Eof,

    #[error("Stream ended inside a frame ({pending} bytes pending)")]
    TruncatedFrame { pending: usize },

    #[error("Invalid frame length {len}")]
    NegativeLength { len: i32 },

    #[error("Stream closed")]
    Closed,

    #[error("No frame received for {ms}ms")]
    HeartbeatTimeout { ms: u64 },
}

impl StreamError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::FatalStream
    }
}

/// Errors from producer lifecycle calls.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Producer already started")]
    AlreadyStarted,

    #[error("Producer already closed")]
    Closed,

    #[error("Failed to spawn process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process '{command}' has no stdout pipe")]
    NoStdout { command: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_classes() {
        let sec: DecodeError = SecurityViolation::new("evil.Gadget").into();
        assert_eq!(sec.class(), ErrorClass::SecurityViolation);
        assert!(sec.is_security_violation());
        assert_eq!(
            DecodeError::malformed("short").class(),
            ErrorClass::RecoverableDecode
        );
    }

    #[test]
    fn stream_errors_are_fatal() {
        assert_eq!(StreamError::Eof.class(), ErrorClass::FatalStream);
        assert_eq!(
            StreamError::NegativeLength { len: -1 }.class(),
            ErrorClass::FatalStream
        );
    }
}
