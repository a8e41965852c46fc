//! Configuration traits for decoupled config passing between crates.
//!
//! These traits let the cache depend on configuration capabilities without
//! knowing the full configuration file structure.

use std::time::Duration;

/// Base trait for all configuration types.
///
/// Implementations should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Logical session cache configuration.
pub trait HasLogicalSessionConfig: ConfigProvider {
    /// Interval between sessions collection refresh (and reap) runs.
    fn refresh_interval(&self) -> Duration;

    /// Whether the periodic refresh and reap jobs are disabled.
    fn refresh_disabled(&self) -> bool {
        false
    }

    /// Maximum number of sessions held in the active cache.
    fn max_sessions(&self) -> usize;

    /// How long a transaction record is kept after its session was last used.
    fn transaction_record_minimum_lifetime(&self) -> Duration;
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default logical session configuration values.
pub mod defaults {
    use std::time::Duration;

    pub const LOGICAL_SESSION_REFRESH_MILLIS: u64 = 300_000;
    pub const DISABLE_LOGICAL_SESSION_CACHE_REFRESH: bool = false;
    pub const MAX_SESSIONS: usize = 1_000_000;
    pub const TRANSACTION_RECORD_MINIMUM_LIFETIME_MINUTES: u64 = 30;
    /// Idle time after which the sessions collection expires a record.
    pub const LOCAL_LOGICAL_SESSION_TIMEOUT_MINUTES: u64 = 30;

    pub fn refresh_interval() -> Duration {
        Duration::from_millis(LOGICAL_SESSION_REFRESH_MILLIS)
    }

    pub fn transaction_record_minimum_lifetime() -> Duration {
        Duration::from_secs(TRANSACTION_RECORD_MINIMUM_LIFETIME_MINUTES * 60)
    }

    pub fn local_logical_session_timeout() -> Duration {
        Duration::from_secs(LOCAL_LOGICAL_SESSION_TIMEOUT_MINUTES * 60)
    }
}

/// Standalone logical session configuration.
#[derive(Debug, Clone)]
pub struct LogicalSessionConfigProvider {
    pub refresh_interval: Duration,
    pub refresh_disabled: bool,
    pub max_sessions: usize,
    pub transaction_record_minimum_lifetime: Duration,
}

impl Default for LogicalSessionConfigProvider {
    fn default() -> Self {
        Self {
            refresh_interval: defaults::refresh_interval(),
            refresh_disabled: defaults::DISABLE_LOGICAL_SESSION_CACHE_REFRESH,
            max_sessions: defaults::MAX_SESSIONS,
            transaction_record_minimum_lifetime: defaults::transaction_record_minimum_lifetime(),
        }
    }
}

impl ConfigProvider for LogicalSessionConfigProvider {}

impl HasLogicalSessionConfig for LogicalSessionConfigProvider {
    fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn refresh_disabled(&self) -> bool {
        self.refresh_disabled
    }

    fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn transaction_record_minimum_lifetime(&self) -> Duration {
        self.transaction_record_minimum_lifetime
    }
}
