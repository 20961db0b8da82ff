//! # Exclusion Filter
//!
//! Decides whether a discovered path stays out of the catalog. Patterns are
//! regular expressions searched in the full path, or globs (prefix `glob:`)
//! matched against the whole path. Only active patterns take part.

use crate::error::{RefileError, Result};
use crate::state::ExclusionPattern;
use glob::Pattern;
use regex::Regex;

const GLOB_PREFIX: &str = "glob:";

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Glob(Pattern),
}

impl Matcher {
    fn parse(pattern: &str) -> Result<Self> {
        match pattern.strip_prefix(GLOB_PREFIX) {
            Some(glob) => Pattern::new(glob)
                .map(Matcher::Glob)
                .map_err(|e| RefileError::InvalidRegex(format!("invalid glob '{}': {}", glob, e))),
            None => Regex::new(pattern)
                .map(Matcher::Regex)
                .map_err(|e| RefileError::InvalidRegex(e.to_string())),
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(path),
            Self::Glob(glob) => glob.matches(path),
        }
    }
}

/// Check that an exclusion pattern string is usable
pub fn validate(pattern: &str) -> Result<()> {
    Matcher::parse(pattern).map(|_| ())
}

/// Compiled set of active exclusion patterns
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    matchers: Vec<(String, Matcher)>,
}

impl ExclusionFilter {
    /// Compile the active patterns; unusable ones are skipped with a warning
    pub fn new(patterns: &[ExclusionPattern]) -> Self {
        let mut matchers = Vec::new();
        for p in patterns.iter().filter(|p| p.is_active) {
            match Matcher::parse(&p.pattern) {
                Ok(m) => matchers.push((p.name.clone(), m)),
                Err(e) => tracing::warn!(name = %p.name, "Skipping exclusion pattern: {}", e),
            }
        }
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// True if any active pattern matches the full path
    pub fn matches(&self, path: &str) -> bool {
        self.matched_by(path).is_some()
    }

    /// Name of the first matching pattern
    pub fn matched_by(&self, path: &str) -> Option<&str> {
        self.matchers
            .iter()
            .find(|(_, m)| m.is_match(path))
            .map(|(name, _)| name.as_str())
    }
}

/// One-shot form: compile and test in a single call
pub fn matches(path: &str, patterns: &[ExclusionPattern]) -> bool {
    patterns
        .iter()
        .filter(|p| p.is_active)
        .any(|p| Matcher::parse(&p.pattern).is_ok_and(|m| m.is_match(path)))
}
