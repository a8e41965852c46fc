//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]                # logical session cache tunables
//! [logging]                # file logging
//! ```

use std::path::PathBuf;
use std::time::Duration;

use lsc_types::config_defaults as defaults;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Upper bound for the minute-valued session settings (one hundred years).
pub const MAX_DURATION_MINUTES: u64 = 100 * 365 * 24 * 60;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LscConfig {
    /// Session cache configuration.
    pub session: Option<SessionSection>,

    /// Log file configuration.
    pub logging: Option<LoggingConfig>,
}

impl LscConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: LscConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: LscConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[session]` section, or defaults if absent.
    pub fn session_or_default(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults if absent.
    pub fn logging_or_default(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref session) = self.session {
            session.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logical session cache configuration.
///
/// ```toml
/// [session]
/// logical_session_refresh_millis = 300000
/// disable_logical_session_cache_refresh = false
/// max_sessions = 1000000
/// transaction_record_minimum_lifetime_minutes = 30
/// local_logical_session_timeout_minutes = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Interval between refresh and reap runs, in milliseconds.
    pub logical_session_refresh_millis: u64,
    /// Skip scheduling the periodic jobs entirely.
    pub disable_logical_session_cache_refresh: bool,
    /// Maximum number of sessions held in the active cache.
    pub max_sessions: usize,
    /// Minimum idle time before a session's transaction records are reaped.
    pub transaction_record_minimum_lifetime_minutes: u64,
    /// Idle time after which the sessions collection expires a record.
    pub local_logical_session_timeout_minutes: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            logical_session_refresh_millis: defaults::LOGICAL_SESSION_REFRESH_MILLIS,
            disable_logical_session_cache_refresh: defaults::DISABLE_LOGICAL_SESSION_CACHE_REFRESH,
            max_sessions: defaults::MAX_SESSIONS,
            transaction_record_minimum_lifetime_minutes:
                defaults::TRANSACTION_RECORD_MINIMUM_LIFETIME_MINUTES,
            local_logical_session_timeout_minutes: defaults::LOCAL_LOGICAL_SESSION_TIMEOUT_MINUTES,
        }
    }
}

impl SessionSection {
    /// Idle timeout applied by the sessions collection.
    pub fn local_logical_session_timeout(&self) -> Duration {
        Duration::from_secs(self.local_logical_session_timeout_minutes.saturating_mul(60))
    }

    fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_sessions".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.logical_session_refresh_millis == 0 && !self.disable_logical_session_cache_refresh
        {
            return Err(ConfigError::InvalidValue {
                field: "session.logical_session_refresh_millis".to_string(),
                reason: "must be positive unless refresh is disabled".to_string(),
            });
        }
        for (field, minutes) in [
            (
                "session.transaction_record_minimum_lifetime_minutes",
                self.transaction_record_minimum_lifetime_minutes,
            ),
            (
                "session.local_logical_session_timeout_minutes",
                self.local_logical_session_timeout_minutes,
            ),
        ] {
            if minutes > MAX_DURATION_MINUTES {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must be at most {MAX_DURATION_MINUTES} minutes"),
                });
            }
        }
        Ok(())
    }
}

impl lsc_types::ConfigProvider for SessionSection {}

impl lsc_types::HasLogicalSessionConfig for SessionSection {
    fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.logical_session_refresh_millis)
    }

    fn refresh_disabled(&self) -> bool {
        self.disable_logical_session_cache_refresh
    }

    fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn transaction_record_minimum_lifetime(&self) -> Duration {
        Duration::from_secs(self.transaction_record_minimum_lifetime_minutes.saturating_mul(60))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files. Defaults to `<config dir>/logs`.
    pub directory: Option<PathBuf>,
    /// Whether to write JSON logs to the rolling file.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            json: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lsc_types::HasLogicalSessionConfig;

    #[test]
    fn test_empty_config() {
        let config = LscConfig::new();
        assert!(config.session.is_none());
        assert!(config.logging.is_none());
        assert_eq!(config.session_or_default(), SessionSection::default());
    }

    #[test]
    fn test_parse_session_section() {
        let toml = r#"
[session]
logical_session_refresh_millis = 1000
max_sessions = 50
"#;
        let config = LscConfig::from_toml(toml).unwrap();
        let session = config.session.as_ref().unwrap();
        assert_eq!(session.refresh_interval(), Duration::from_secs(1));
        assert_eq!(session.max_sessions(), 50);
        // unspecified keys fall back to defaults
        assert!(!session.refresh_disabled());
        assert_eq!(
            session.transaction_record_minimum_lifetime(),
            Duration::from_secs(30 * 60)
        );
        assert_eq!(
            session.local_logical_session_timeout(),
            Duration::from_secs(30 * 60)
        );
    }

    #[test]
    fn test_parse_logging_section() {
        let toml = r#"
[logging]
directory = "/var/log/lsc"
json = false
"#;
        let config = LscConfig::from_toml(toml).unwrap();
        let logging = config.logging_or_default();
        assert_eq!(logging.directory, Some(PathBuf::from("/var/log/lsc")));
        assert!(!logging.json);
    }

    #[test]
    fn test_rejects_zero_max_sessions() {
        let err = LscConfig::from_toml("[session]\nmax_sessions = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "session.max_sessions"));
    }

    #[test]
    fn test_rejects_out_of_range_minutes() {
        let err = LscConfig::from_toml(
            "[session]\ntransaction_record_minimum_lifetime_minutes = 200000000000\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. }
            if field == "session.transaction_record_minimum_lifetime_minutes"));

        let err = LscConfig::from_toml(&format!(
            "[session]\nlocal_logical_session_timeout_minutes = {}\n",
            MAX_DURATION_MINUTES + 1
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. }
            if field == "session.local_logical_session_timeout_minutes"));

        let at_limit = LscConfig::from_toml(&format!(
            "[session]\ntransaction_record_minimum_lifetime_minutes = {MAX_DURATION_MINUTES}\n"
        ))
        .unwrap();
        assert_eq!(
            at_limit.session_or_default().transaction_record_minimum_lifetime(),
            Duration::from_secs(MAX_DURATION_MINUTES * 60)
        );
    }

    #[test]
    fn test_unvalidated_minutes_saturate() {
        let session = SessionSection {
            transaction_record_minimum_lifetime_minutes: u64::MAX,
            local_logical_session_timeout_minutes: u64::MAX,
            ..Default::default()
        };
        assert_eq!(
            session.transaction_record_minimum_lifetime(),
            Duration::from_secs(u64::MAX)
        );
        assert_eq!(session.local_logical_session_timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_zero_interval_allowed_when_disabled() {
        assert!(LscConfig::from_toml("[session]\nlogical_session_refresh_millis = 0\n").is_err());

        let toml = r#"
[session]
logical_session_refresh_millis = 0
disable_logical_session_cache_refresh = true
"#;
        let config = LscConfig::from_toml(toml).unwrap();
        assert!(config.session_or_default().refresh_disabled());
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = LscConfig::from_toml(
            r#"
[session]
max_sessions = 10

[logging]
json = false
"#,
        )
        .unwrap();
        let overlay = LscConfig::from_toml("[session]\nlogical_session_refresh_millis = 5000\n")
            .unwrap();

        base.merge(overlay);
        let session = base.session_or_default();
        assert_eq!(session.logical_session_refresh_millis, 5000);
        // whole section replaced, so max_sessions is back to default
        assert_eq!(session.max_sessions, defaults::MAX_SESSIONS);
        assert!(!base.logging_or_default().json);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = LscConfig {
            session: Some(SessionSection {
                max_sessions: 42,
                ..Default::default()
            }),
            logging: None,
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("max_sessions = 42"));
        assert_eq!(LscConfig::from_toml(&text).unwrap(), config);
    }
}
