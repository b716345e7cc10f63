//! Cache addressing.
//!
//! A [`QueryKey`] is an ordered list of string segments such as
//! `["leads"]` or `["deals", "42"]`. Keys are compared segment by segment,
//! and a key is a prefix of every key that extends it, which is what prefix
//! invalidation relies on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryKey(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a new key with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        QueryKey(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when `self` equals `prefix` or extends it.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl From<&str> for QueryKey {
    fn from(segment: &str) -> Self {
        QueryKey(vec![segment.to_string()])
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching_is_segment_wise() {
        let leads = QueryKey::from("leads");
        let lead = leads.child("42");
        assert!(lead.starts_with(&leads));
        assert!(leads.starts_with(&leads));
        assert!(!leads.starts_with(&lead));
        assert!(!QueryKey::from("leadsx").starts_with(&leads));
    }

    #[test]
    fn display_lists_segments() {
        assert_eq!(QueryKey::new(["deals", "7"]).to_string(), "[deals, 7]");
    }
}
