//! Configuration for local watcher behavior.

use crate::config::UserSettings;

/// Configuration for local watcher behavior.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after which collected events form a batch.
    pub debounce_delay_ms: u64,
    /// Whether to report hidden files and directories.
    pub include_hidden: bool,
    /// Regular expressions for paths (relative to their watched directory)
    /// that never produce events.
    pub ignore_patterns: Vec<String>,
}

impl WatcherConfig {
    /// Takes the watcher related part of the user settings.
    #[must_use]
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            debounce_delay_ms: settings.debounce_delay_ms,
            include_hidden: settings.include_hidden,
            ignore_patterns: settings.ignore_patterns.clone(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: 500,
            include_hidden: false,
            ignore_patterns: vec![],
        }
    }
}
