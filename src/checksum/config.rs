//! Configuration for checksum retries.

use std::time::Duration;

/// Configuration for checksum retries.
#[derive(Debug, Clone)]
pub struct ChecksumConfig {
    /// How many times a busy file is retried.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub base_delay_ms: u64,
}

impl ChecksumConfig {
    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::checksum::config::ChecksumConfig;

    #[test]
    fn test_default_backoff_schedule() {
        let config = ChecksumConfig::default();
        let delays: Vec<Duration> = (0..config.max_retries)
            .map(|attempt| config.retry_delay(attempt))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn test_backoff_saturates() {
        let config = ChecksumConfig::default();
        assert_eq!(config.retry_delay(200), Duration::from_millis(u64::MAX));
    }
}
