//! Decides which paths are worth reporting.

use std::path::{Component, Path};

use regex::Regex;

use crate::{error::domain::WatchError, local::watcher::config::WatcherConfig};

/// Path filter built from the ignore patterns and the hidden-file option.
///
/// Paths are checked relative to the directory they are watched from, so a
/// watched directory that itself lives below a hidden one still reports.
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<Regex>,
    include_hidden: bool,
}

impl PathFilter {
    /// Compiles the filter.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::PatternError` for an invalid ignore pattern.
    pub fn new(config: &WatcherConfig) -> Result<Self, WatchError> {
        let patterns = config
            .ignore_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            include_hidden: config.include_hidden,
        })
    }

    /// Whether events on `relative` should be dropped.
    ///
    /// # Arguments
    ///
    /// * `relative` - Path relative to its watched directory.
    #[must_use]
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if !self.include_hidden && is_hidden(relative) {
            return true;
        }

        let text = relative.to_string_lossy();
        self.patterns.iter().any(|pattern| pattern.is_match(&text))
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| {
        matches!(component, Component::Normal(name) if name.as_encoded_bytes().starts_with(b"."))
    })
}
