//! Configuration for the local change pipeline.

use crate::{checksum::ChecksumConfig, config::UserSettings, local::watcher::WatcherConfig};

/// Configuration for the local change pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Local watcher configuration.
    pub watcher_config: WatcherConfig,
    /// Checksum retry configuration.
    pub checksum_config: ChecksumConfig,
    /// Capacity of the channel between the notify thread and the annotator.
    pub change_capacity: usize,
}

impl PipelineConfig {
    /// Builds the configuration from the user settings.
    #[must_use]
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            watcher_config: WatcherConfig::from_settings(settings),
            checksum_config: ChecksumConfig {
                max_retries: settings.checksum_max_retries,
                base_delay_ms: settings.checksum_base_delay_ms,
            },
            ..Self::default()
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watcher_config: WatcherConfig::default(),
            checksum_config: ChecksumConfig::default(),
            // Large enough for the burst of a recursive copy.
            change_capacity: 4096,
        }
    }
}
