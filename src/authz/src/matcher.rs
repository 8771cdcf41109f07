//! Wildcard pattern matching for actions and resources
//!
//! Patterns are literal strings with `*` matching any run of characters
//! (including none). Matches are anchored over the whole candidate and
//! case-sensitive. A pattern without `*` is a plain equality test and
//! never touches the regex engine.

use crate::error::{AuthzError, Result};
use dashmap::DashMap;
use regex::Regex;

/// Pattern matcher with a shared compiled-regex cache
///
/// Wildcard patterns compile to anchored regexes with every literal
/// segment escaped; compiled programs are cached so repeated decisions
/// over the same policies reuse them.
#[derive(Debug, Default)]
pub struct Matcher {
    cache: DashMap<String, Regex>,
}

impl Matcher {
    /// Create a new matcher with an empty cache
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Check whether a pattern matches a candidate string
    ///
    /// # Examples
    ///
    /// ```
    /// use warden_authz::matcher::Matcher;
    ///
    /// let matcher = Matcher::new();
    /// assert!(matcher.matches("db:read", "db:read").unwrap());
    /// assert!(matcher.matches("db:*", "db:read").unwrap());
    /// assert!(!matcher.matches("db:*", "queue:read").unwrap());
    /// ```
    pub fn matches(&self, pattern: &str, candidate: &str) -> Result<bool> {
        if !pattern.contains('*') {
            return Ok(pattern == candidate);
        }

        if let Some(regex) = self.cache.get(pattern) {
            return Ok(regex.is_match(candidate));
        }

        let regex = Self::compile(pattern)?;
        let matched = regex.is_match(candidate);
        self.cache.insert(pattern.to_string(), regex);
        Ok(matched)
    }

    /// Check whether any pattern in a list matches the candidate
    pub fn matches_any<S: AsRef<str>>(&self, patterns: &[S], candidate: &str) -> Result<bool> {
        for pattern in patterns {
            if self.matches(pattern.as_ref(), candidate)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compile a wildcard pattern to an anchored regex
    fn compile(pattern: &str) -> Result<Regex> {
        let mut source = String::with_capacity(pattern.len() + 4);
        source.push('^');
        for segment in pattern.split('*') {
            if !source.ends_with('^') {
                source.push_str(".*");
            }
            source.push_str(&regex::escape(segment));
        }
        source.push('$');

        Regex::new(&source)
            .map_err(|e| AuthzError::internal(format!("pattern '{}' failed to compile: {}", pattern, e)))
    }
}

/// Returns true when the pattern contains no wildcard
///
/// Action listing only reports literal actions; wildcard allow patterns
/// are skipped rather than expanded.
pub fn is_literal(pattern: &str) -> bool {
    !pattern.contains('*')
}
