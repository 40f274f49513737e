//! Immutable set of permitted type names.

use std::collections::HashSet;
use std::sync::Arc;

/// Fully-qualified type names that may be materialized from a payload.
///
/// Built once by the caller and shared by value; cloning is cheap and the
/// set can never change after construction.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    names: Arc<HashSet<String>>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.names.contains(type_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        let list = AllowList::new(["app.LoggingEvent", "app.Marker"]);
        assert!(list.contains("app.LoggingEvent"));
        assert!(!list.contains("app.loggingevent"));
        assert!(!list.contains("app.LoggingEvent2"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn clones_share_contents() {
        let list: AllowList = vec!["b", "a"].into_iter().collect();
        let copy = list.clone();
        assert_eq!(copy.names(), vec!["a", "b"]);
    }
}
