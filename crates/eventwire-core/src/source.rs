//! Stream origin identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the origin of one stream.
///
/// `primary` is fixed when the stream is accepted (peer address, command
/// line, ...). `secondary` is discovered later from decoded payloads, e.g. an
/// application instance UUID, and may change over the stream's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentifier {
    primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary: Option<String>,
}

impl SourceIdentifier {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Some(secondary.into()),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Record a discovered secondary identifier.
    ///
    /// Returns `true` if the stored value changed. Re-discovering the current
    /// value is a no-op; a differing value overwrites.
    pub fn set_secondary(&mut self, secondary: impl Into<String>) -> bool {
        let secondary = secondary.into();
        if self.secondary.as_deref() == Some(secondary.as_str()) {
            return false;
        }
        self.secondary = Some(secondary);
        true
    }
}

impl fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.secondary {
            Some(secondary) => write!(f, "{}-{}", self.primary, secondary),
            None => write!(f, "{}", self.primary),
        }
    }
}
