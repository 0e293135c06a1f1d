//! Include/exclude filtering using regular expressions
//!
//! Patterns are searched anywhere in the path relative to the sync root,
//! so `\.log$` matches `logs/app.log` and `cache` matches `a/cache/b`.

use regex::Regex;

use crate::error::{Result, SyncError};

/// Compiled include and exclude patterns for one sync pass
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl FilterSet {
    /// Compile both pattern lists
    pub fn new<I, E>(includes: I, excludes: E) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Decide whether a relative path takes part in the sync.
    ///
    /// Excludes win over includes; an empty include list accepts everything
    /// not excluded.
    pub fn accepts(&self, relative_path: &str) -> bool {
        if self.excludes.iter().any(|re| re.is_match(relative_path)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|re| re.is_match(relative_path))
    }

    /// Number of compiled include patterns
    pub fn include_count(&self) -> usize {
        self.includes.len()
    }

    /// Number of compiled exclude patterns
    pub fn exclude_count(&self) -> usize {
        self.excludes.len()
    }
}

/// Compile a list of pattern strings
pub fn compile<P>(patterns: P) -> Result<Vec<Regex>>
where
    P: IntoIterator,
    P::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            Regex::new(pattern).map_err(|e| {
                SyncError::FilterPattern(format!("Failed to compile pattern '{}': {}", pattern, e))
            })
        })
        .collect()
}
