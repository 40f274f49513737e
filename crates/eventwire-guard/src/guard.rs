//! `WhitelistGuard`: checks every declared type in an object graph.

use crate::allow_list::AllowList;
use eventwire_core::error::{DecodeError, SecurityViolation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, warn};

/// Reserved key carrying an object's declared type name.
pub const TYPE_TAG: &str = "@type";

/// Reported in place of a type name when the tag is not a string.
const NON_STRING_TAG: &str = "<non-string>";

/// Whether violations are rejected or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardMode {
    /// Reject any payload declaring a type outside the allow-list.
    #[default]
    Enforce,
    /// Log violations but let payloads through. Only for building an
    /// allow-list against known traffic; never for untrusted peers.
    DryRun,
}

/// Guard configuration as loaded from a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub allowed_types: Vec<String>,
    #[serde(default)]
    pub mode: GuardMode,
    /// Graphs nested deeper than this are rejected as malformed.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Distinct rejected names remembered for once-only logging.
    #[serde(default = "default_max_reported")]
    pub max_reported: usize,
}

fn default_max_depth() -> usize {
    128
}

fn default_max_reported() -> usize {
    1024
}

/// Errors raised while inspecting a graph.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    Violation(#[from] SecurityViolation),

    #[error("object graph nested deeper than {max_depth} levels")]
    TooDeep { max_depth: usize },
}

impl From<GuardError> for DecodeError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::Violation(v) => DecodeError::Security(v),
            GuardError::TooDeep { max_depth } => DecodeError::malformed(format!(
                "object graph nested deeper than {max_depth} levels"
            )),
        }
    }
}

/// Validates declared type names against an [`AllowList`].
///
/// Each distinct rejected name is logged once per guard; every occurrence is
/// still rejected (in [`GuardMode::Enforce`]) and counted. At most
/// `max_reported` names are remembered. Names seen after that are rejected
/// and counted without being logged.
pub struct WhitelistGuard {
    allowed: AllowList,
    mode: GuardMode,
    max_depth: usize,
    max_reported: usize,
    reported: Mutex<HashSet<String>>,
    reports_suppressed: AtomicBool,
    violations: AtomicU64,
}

impl WhitelistGuard {
    pub fn new(allowed: AllowList, mode: GuardMode) -> Self {
        Self {
            allowed,
            mode,
            max_depth: default_max_depth(),
            max_reported: default_max_reported(),
            reported: Mutex::new(HashSet::new()),
            reports_suppressed: AtomicBool::new(false),
            violations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            AllowList::new(config.allowed_types.iter().cloned()),
            config.mode,
        )
        .with_max_depth(config.max_depth)
        .with_max_reported(config.max_reported)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    pub fn allowed(&self) -> &AllowList {
        &self.allowed
    }

    /// Total violations seen, including dry-run and repeated ones.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Distinct type names that have been reported, sorted.
    pub fn reported_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reported.lock().unwrap().iter().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Check a single declared type name.
    pub fn check_type(&self, type_name: &str) -> Result<(), SecurityViolation> {
        if self.allowed.contains(type_name) {
            return Ok(());
        }
        self.violations.fetch_add(1, Ordering::Relaxed);

        let first_sighting = self.remember(type_name);
        match self.mode {
            GuardMode::Enforce => {
                if first_sighting {
                    error!(type_name, "rejected payload declaring a type outside the allow-list");
                }
                Err(SecurityViolation::new(type_name))
            }
            GuardMode::DryRun => {
                if first_sighting {
                    warn!(type_name, "dry-run: type outside the allow-list would be rejected");
                }
                Ok(())
            }
        }
    }

    /// Record a rejected name. Returns `true` if it should be logged.
    fn remember(&self, type_name: &str) -> bool {
        let mut reported = self.reported.lock().unwrap();
        if reported.contains(type_name) {
            return false;
        }
        if reported.len() < self.max_reported {
            reported.insert(type_name.to_string());
            return true;
        }
        if !self.reports_suppressed.swap(true, Ordering::Relaxed) {
            warn!(
                remembered = reported.len(),
                "too many distinct rejected types, further distinct violations suppressed"
            );
        }
        false
    }

    /// Walk the whole graph and check every object's declared type.
    ///
    /// Objects without a type tag are plain data and are descended into.
    /// In enforcing mode the walk stops at the first violation.
    pub fn inspect(&self, graph: &Value) -> Result<(), GuardError> {
        let mut pending: Vec<(&Value, usize)> = vec![(graph, 1)];

        while let Some((node, depth)) = pending.pop() {
            if depth > self.max_depth {
                return Err(GuardError::TooDeep {
                    max_depth: self.max_depth,
                });
            }
            match node {
                Value::Object(map) => {
                    if let Some(tag) = map.get(TYPE_TAG) {
                        let type_name = tag.as_str().unwrap_or(NON_STRING_TAG);
                        self.check_type(type_name)?;
                    }
                    for (key, child) in map {
                        if key != TYPE_TAG {
                            pending.push((child, depth + 1));
                        }
                    }
                }
                Value::Array(items) => {
                    pending.extend(items.iter().map(|child| (child, depth + 1)));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for WhitelistGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistGuard")
            .field("mode", &self.mode)
            .field("allowed", &self.allowed.len())
            .field("violations", &self.violations())
            .finish()
    }
}
