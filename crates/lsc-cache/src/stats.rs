//! Counters reported by the logical session cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cache statistics.
///
/// Job counts accumulate for the life of the cache; the `last_*` fields
/// describe the most recent run of each job and are reset when a run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Sessions currently in the active cache.
    pub active_sessions_count: usize,

    pub sessions_collection_job_count: u64,
    pub last_sessions_collection_job_duration_millis: u64,
    pub last_sessions_collection_job_timestamp: Option<DateTime<Utc>>,
    pub last_sessions_collection_job_entries_refreshed: usize,
    pub last_sessions_collection_job_entries_ended: usize,
    pub last_sessions_collection_job_cursors_closed: usize,

    pub transaction_reaper_job_count: u64,
    pub last_transaction_reaper_job_duration_millis: u64,
    pub last_transaction_reaper_job_timestamp: Option<DateTime<Utc>>,
    pub last_transaction_reaper_job_entries_cleaned_up: usize,
}

impl CacheStats {
    /// Reset the per-run refresh fields and count a new run.
    pub(crate) fn begin_refresh(&mut self, now: DateTime<Utc>) {
        self.sessions_collection_job_count += 1;
        self.last_sessions_collection_job_timestamp = Some(now);
        self.last_sessions_collection_job_duration_millis = 0;
        self.last_sessions_collection_job_entries_refreshed = 0;
        self.last_sessions_collection_job_entries_ended = 0;
        self.last_sessions_collection_job_cursors_closed = 0;
    }

    /// Reset the per-run reap fields and count a new run.
    pub(crate) fn begin_reap(&mut self, now: DateTime<Utc>) {
        self.transaction_reaper_job_count += 1;
        self.last_transaction_reaper_job_timestamp = Some(now);
        self.last_transaction_reaper_job_duration_millis = 0;
        self.last_transaction_reaper_job_entries_cleaned_up = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_refresh_resets_run_fields() {
        let mut stats = CacheStats {
            last_sessions_collection_job_entries_refreshed: 4,
            last_sessions_collection_job_entries_ended: 2,
            last_sessions_collection_job_cursors_closed: 1,
            last_sessions_collection_job_duration_millis: 30,
            transaction_reaper_job_count: 3,
            ..Default::default()
        };
        let now = Utc::now();
        stats.begin_refresh(now);

        assert_eq!(stats.sessions_collection_job_count, 1);
        assert_eq!(stats.last_sessions_collection_job_timestamp, Some(now));
        assert_eq!(stats.last_sessions_collection_job_entries_refreshed, 0);
        assert_eq!(stats.last_sessions_collection_job_entries_ended, 0);
        assert_eq!(stats.last_sessions_collection_job_cursors_closed, 0);
        assert_eq!(stats.last_sessions_collection_job_duration_millis, 0);
        // reap counters untouched
        assert_eq!(stats.transaction_reaper_job_count, 3);
    }

    #[test]
    fn test_serializes_server_status_names() {
        let json = serde_json::to_value(CacheStats::default()).unwrap();
        assert!(json.get("activeSessionsCount").is_some());
        assert!(json.get("lastSessionsCollectionJobEntriesRefreshed").is_some());
        assert!(json.get("lastTransactionReaperJobEntriesCleanedUp").is_some());
    }
}
