//! Key Pattern Module
//!
//! Glob patterns with at most one `*` wildcard, used to select cache keys
//! for invalidation.

use crate::error::{CacheError, Result};

/// A parsed key pattern: `prefix*suffix`, or an exact key when no `*` is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    prefix: String,
    suffix: Option<String>,
}

impl KeyPattern {
    /// Parses `pattern`, rejecting more than one wildcard.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut parts = pattern.splitn(2, '*');
        let prefix = parts.next().unwrap_or_default().to_string();
        let suffix = parts.next().map(str::to_string);

        if suffix.as_deref().is_some_and(|s| s.contains('*')) {
            return Err(CacheError::InvalidRequest(format!(
                "pattern '{}' has more than one '*' wildcard",
                pattern
            )));
        }

        Ok(Self { prefix, suffix })
    }

    pub fn has_wildcard(&self) -> bool {
        self.suffix.is_some()
    }

    // == Matches ==
    /// Returns true if `key` matches the pattern.
    pub fn matches(&self, key: &str) -> bool {
        match &self.suffix {
            None => key == self.prefix,
            Some(suffix) => {
                key.len() >= self.prefix.len() + suffix.len()
                    && key.starts_with(&self.prefix)
                    && key.ends_with(suffix.as_str())
            }
        }
    }

    // == Resolve ==
    /// Substitutes `value` for the wildcard, producing a concrete key.
    ///
    /// Patterns without a wildcard resolve to themselves.
    pub fn resolve(&self, value: &str) -> String {
        match &self.suffix {
            None => self.prefix.clone(),
            Some(suffix) => format!("{}{}{}", self.prefix, value, suffix),
        }
    }
}
