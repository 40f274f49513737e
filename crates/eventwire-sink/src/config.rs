//! Sink configuration and the source filter policy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Which sources may place real events in the sink. Sentinels always pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "sources", rename_all = "kebab-case")]
pub enum SourceFilter {
    /// Admit everything.
    #[default]
    None,
    /// Admit only these primary identifiers.
    AllowList(HashSet<String>),
    /// Admit everything except these primary identifiers.
    DenyList(HashSet<String>),
}

impl SourceFilter {
    pub fn allow<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(sources.into_iter().map(Into::into).collect())
    }

    pub fn deny<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DenyList(sources.into_iter().map(Into::into).collect())
    }

    /// Whether a real event from `primary` passes this filter.
    pub fn admits(&self, primary: &str) -> bool {
        match self {
            Self::None => true,
            Self::AllowList(allowed) => allowed.contains(primary),
            Self::DenyList(denied) => !denied.contains(primary),
        }
    }
}

/// Configuration for a `BoundedEventSink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Maximum number of buffered wrappers; the oldest is evicted beyond it.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Pause applied to the writer after each eviction (0 = none).
    #[serde(default)]
    pub congestion_delay_ms: u64,
    #[serde(default)]
    pub filter: SourceFilter,
}

fn default_capacity() -> usize { 10_000 }

impl SinkConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_congestion_delay(mut self, delay: Duration) -> Self {
        self.congestion_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn congestion_delay(&self) -> Duration {
        Duration::from_millis(self.congestion_delay_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            congestion_delay_ms: 0,
            filter: SourceFilter::None,
        }
    }
}
