//! Configuration for the logical session cache.

use std::time::Duration;

use lsc_types::{HasLogicalSessionConfig, config_defaults as defaults};

/// Configuration for the logical session cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Interval at which the refresh and reap jobs are scheduled.
    pub refresh_interval: Duration,

    /// When true, no background jobs are scheduled.
    /// `refresh_now`/`reap_now` still work.
    pub refresh_disabled: bool,

    /// Maximum number of sessions in the active cache. Inserts beyond
    /// this are rejected, nothing is evicted.
    pub max_sessions: usize,

    /// Transaction records whose session was last used longer ago than
    /// this are eligible for reaping.
    pub transaction_record_minimum_lifetime: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: defaults::refresh_interval(),
            refresh_disabled: defaults::DISABLE_LOGICAL_SESSION_CACHE_REFRESH,
            max_sessions: defaults::MAX_SESSIONS,
            transaction_record_minimum_lifetime: defaults::transaction_record_minimum_lifetime(),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from any logical session config provider.
    pub fn from_provider<C: HasLogicalSessionConfig>(provider: &C) -> Self {
        Self {
            refresh_interval: provider.refresh_interval(),
            refresh_disabled: provider.refresh_disabled(),
            max_sessions: provider.max_sessions(),
            transaction_record_minimum_lifetime: provider.transaction_record_minimum_lifetime(),
        }
    }

    /// Set the job interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Enable or disable the background jobs.
    pub fn with_refresh_disabled(mut self, disabled: bool) -> Self {
        self.refresh_disabled = disabled;
        self
    }

    /// Set the maximum number of active sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the minimum lifetime of transaction records.
    pub fn with_transaction_record_minimum_lifetime(mut self, lifetime: Duration) -> Self {
        self.transaction_record_minimum_lifetime = lifetime;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsc_types::LogicalSessionConfigProvider;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_millis(300_000));
        assert!(!config.refresh_disabled);
        assert_eq!(config.max_sessions, 1_000_000);
        assert_eq!(
            config.transaction_record_minimum_lifetime,
            Duration::from_secs(1800)
        );
    }

    #[test]
    fn test_from_provider() {
        let provider = LogicalSessionConfigProvider {
            refresh_interval: Duration::from_secs(10),
            refresh_disabled: true,
            max_sessions: 5,
            transaction_record_minimum_lifetime: Duration::from_secs(60),
        };
        let config = CacheConfig::from_provider(&provider);
        assert_eq!(config.refresh_interval, Duration::from_secs(10));
        assert!(config.refresh_disabled);
        assert_eq!(config.max_sessions, 5);
        assert_eq!(
            config.transaction_record_minimum_lifetime,
            Duration::from_secs(60)
        );
    }
}
