//! Catalog query keys.
//!
//! - `$vision.resnet`: exact id.
//! - `r/vision\..*`: regex, anchored at the start of the id.
//! - anything else: glob over the id with an implicit leading `*`, so
//!   `resnet` matches `vision.resnet`.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::entry::EntryId;
use crate::error::LookupError;

/// Prefix of an exact-id query.
pub const EXACT_PREFIX: &str = "$";

/// Prefix of a regex query.
pub const REGEX_PREFIX: &str = "r/";

/// A parsed query key.
#[derive(Debug, Clone)]
pub enum Query {
    /// Exact id match.
    Exact(String),
    /// Regex match anchored at the start of the id.
    Regex(Regex),
    /// Glob match over the whole id.
    Glob(GlobMatcher),
}

impl Query {
    /// Parse a query key.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidPattern`] for an empty key or a regex
    /// or glob that does not compile.
    pub fn parse(key: &str) -> Result<Self, LookupError> {
        let invalid = |message: String| LookupError::InvalidPattern {
            pattern: key.to_owned(),
            message,
        };
        if key.is_empty() {
            return Err(invalid("empty query".to_owned()));
        }

        if let Some(id) = key.strip_prefix(EXACT_PREFIX) {
            return Ok(Self::Exact(id.to_owned()));
        }
        if let Some(pattern) = key.strip_prefix(REGEX_PREFIX) {
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| invalid(e.to_string()))?;
            return Ok(Self::Regex(regex));
        }

        let pattern = if key.starts_with('*') {
            key.to_owned()
        } else {
            format!("*{key}")
        };
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self::Glob(glob.compile_matcher()))
    }

    /// Whether `id` matches.
    #[must_use]
    pub fn matches(&self, id: &EntryId) -> bool {
        let rendered = id.to_string();
        match self {
            Self::Exact(exact) => rendered == *exact,
            Self::Regex(regex) => regex.is_match(&rendered),
            Self::Glob(glob) => glob.is_match(&rendered),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => write!(f, "{EXACT_PREFIX}{id}"),
            Self::Regex(regex) => write!(f, "{REGEX_PREFIX}{}", regex.as_str()),
            Self::Glob(glob) => f.write_str(glob.glob().glob()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntryId {
        s.parse().unwrap()
    }

    #[test]
    fn exact_matches_whole_id_only() {
        let q = Query::parse("$ns.fn").unwrap();
        assert!(q.matches(&id("ns.fn")));
        assert!(!q.matches(&id("ns.fn2")));
        assert!(!q.matches(&id("xns.fn")));
    }

    #[test]
    fn regex_is_anchored_at_start() {
        let q = Query::parse(r"r/ns\..*").unwrap();
        assert!(q.matches(&id("ns.fn")));
        assert!(!q.matches(&id("other_ns.fn")));

        let q = Query::parse("r/ns1|ns2").unwrap();
        assert!(q.matches(&id("ns2.fn")));
        assert!(!q.matches(&id("x.ns2")));
    }

    #[test]
    fn glob_gets_implicit_star() {
        let q = Query::parse("fn").unwrap();
        assert!(q.matches(&id("ns1.fn")));
        assert!(q.matches(&id("ns2.fn")));
        assert!(!q.matches(&id("ns.fn2")));

        let q = Query::parse("*.res*").unwrap();
        assert!(q.matches(&id("vision.resnet")));
        assert_eq!(q.to_string(), "*.res*");
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            Query::parse("r/("),
            Err(LookupError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Query::parse("[a"),
            Err(LookupError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Query::parse(""),
            Err(LookupError::InvalidPattern { .. })
        ));
    }
}
