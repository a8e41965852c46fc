//! Logical session cache.
//!
//! Tracks the sessions used on this node since the last refresh and keeps
//! the shared sessions collection up to date from them. Two periodic jobs
//! run against the cache: refresh pushes active sessions to the collection
//! and removes explicitly ended ones, reap deletes transaction state of
//! sessions that have been idle past the minimum lifetime.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lsc_types::{KillPatternSet, OwnerDigest, SessionId, SessionRecord};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::collection::SessionsCollection;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::guard::{ScopeGuard, on_scope_exit};
use crate::liaison::{PeriodicJob, ServiceLiaison};
use crate::operation::OperationContext;
use crate::reaper::ReapSessionsOlderThan;
use crate::stats::CacheStats;

/// Name of the periodic refresh job.
pub const REFRESH_JOB_NAME: &str = "LogicalSessionCacheRefresh";

/// Name of the periodic reap job.
pub const REAP_JOB_NAME: &str = "LogicalSessionCacheReap";

/// State protected by the cache mutex.
#[derive(Debug, Default)]
struct CacheState {
    /// Sessions used since the last successful refresh.
    active_sessions: HashMap<SessionId, SessionRecord>,

    /// Sessions explicitly ended, removed durably on the next refresh.
    ending_sessions: HashSet<SessionId>,

    stats: CacheStats,
}

/// In-memory registry of active logical sessions.
///
/// All accessors take the mutex only for the map access itself; durable
/// collection and liaison calls happen on snapshots taken out of the
/// shared state, so operation threads are never blocked behind I/O.
pub struct SessionCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    liaison: Arc<dyn ServiceLiaison>,
    collection: Arc<dyn SessionsCollection>,
    reap: ReapSessionsOlderThan,
}

impl SessionCache {
    /// Create a cache and, unless refresh is disabled, schedule its
    /// refresh and reap jobs on the liaison.
    pub fn new(
        config: CacheConfig,
        liaison: Arc<dyn ServiceLiaison>,
        collection: Arc<dyn SessionsCollection>,
        reap: ReapSessionsOlderThan,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            state: Mutex::new(CacheState::default()),
            config,
            liaison,
            collection,
            reap,
        });

        if cache.config.refresh_disabled {
            info!("Logical session cache refresh disabled, not scheduling jobs");
        } else if cache.config.refresh_interval.is_zero() {
            warn!("Logical session refresh interval is zero, not scheduling jobs");
        } else {
            cache.schedule_jobs();
        }

        cache
    }

    /// Jobs hold a weak reference so a tick never touches a dropped cache.
    fn schedule_jobs(self: &Arc<Self>) {
        let interval = self.config.refresh_interval;

        let weak = Arc::downgrade(self);
        self.liaison
            .schedule_job(PeriodicJob::new(REFRESH_JOB_NAME, interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(cache) = weak.upgrade() {
                        cache.periodic_refresh().await;
                    }
                }
            }));

        let weak = Arc::downgrade(self);
        self.liaison
            .schedule_job(PeriodicJob::new(REAP_JOB_NAME, interval, move || {
                let weak = weak.clone();
                async move {
                    if let Some(cache) = weak.upgrade() {
                        cache.periodic_reap().await;
                    }
                }
            }));
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session operations
    // ─────────────────────────────────────────────────────────────────────

    /// Mark a cached session as used again.
    ///
    /// Advances its `last_use` to the current time. Returns
    /// [`Error::NoSuchSession`] if the session is not cached.
    pub fn promote(&self, id: &SessionId) -> Result<()> {
        let now = self.liaison.now();
        let mut state = self.state.lock();
        match state.active_sessions.get_mut(id) {
            Some(record) => {
                record.touch(now);
                Ok(())
            }
            None => Err(Error::NoSuchSession(*id)),
        }
    }

    /// Insert or replace a session record.
    ///
    /// Rejected with [`Error::TooManyLogicalSessions`] when the cache
    /// already holds `max_sessions` entries.
    pub fn start_session(&self, record: SessionRecord) -> Result<()> {
        let mut state = self.state.lock();
        self.insert_locked(&mut state, record)
    }

    /// Make sure `id` is cached, creating a fresh record if needed.
    pub fn vivify(&self, id: &SessionId) -> Result<()> {
        self.promote_or_insert(id, |now| SessionRecord::new(*id, now))
    }

    /// Promote each id, inserting a fresh record for any that are missing.
    ///
    /// Stops at the first failure; sessions earlier in the batch stay cached.
    pub fn refresh_sessions(&self, ids: &[SessionId]) -> Result<()> {
        for id in ids {
            self.vivify(id)?;
        }
        Ok(())
    }

    /// Promote each record's session, inserting the record if missing.
    ///
    /// Stops at the first failure; records earlier in the batch stay cached.
    pub fn refresh_records(&self, records: &[SessionRecord]) -> Result<()> {
        for record in records {
            self.promote_or_insert(&record.id, |_| record.clone())?;
        }
        Ok(())
    }

    /// Touch `id` if cached, otherwise insert the record built by `make`.
    /// Lookup and insert happen under one lock.
    fn promote_or_insert(
        &self,
        id: &SessionId,
        make: impl FnOnce(DateTime<Utc>) -> SessionRecord,
    ) -> Result<()> {
        let now = self.liaison.now();
        let mut state = self.state.lock();
        if let Some(record) = state.active_sessions.get_mut(id) {
            record.touch(now);
            return Ok(());
        }
        self.insert_locked(&mut state, make(now))
    }

    fn insert_locked(&self, state: &mut CacheState, record: SessionRecord) -> Result<()> {
        if state.active_sessions.len() >= self.config.max_sessions {
            debug!(
                session_id = %record.id,
                max_sessions = self.config.max_sessions,
                "Session cache full, rejecting session"
            );
            return Err(Error::TooManyLogicalSessions {
                max: self.config.max_sessions,
            });
        }

        trace!(session_id = %record.id, "Session added to cache");
        state.active_sessions.insert(record.id, record);
        Ok(())
    }

    /// Schedule sessions for removal at the next refresh.
    ///
    /// The sessions stay visible in the cache until then.
    pub fn end_sessions(&self, ids: impl IntoIterator<Item = SessionId>) {
        let mut state = self.state.lock();
        state.ending_sessions.extend(ids);
    }

    /// Ids of every cached session.
    pub fn list_ids(&self) -> Vec<SessionId> {
        self.state.lock().active_sessions.keys().copied().collect()
    }

    /// Ids of cached sessions owned by any of `owners`.
    pub fn list_ids_for_owners(&self, owners: &HashSet<OwnerDigest>) -> Vec<SessionId> {
        self.state
            .lock()
            .active_sessions
            .keys()
            .filter(|id| id.owner().is_some_and(|owner| owners.contains(owner)))
            .copied()
            .collect()
    }

    /// Look up a cached record without touching it.
    pub fn peek_cached(&self, id: &SessionId) -> Option<SessionRecord> {
        self.state.lock().active_sessions.get(id).cloned()
    }

    /// Number of cached sessions.
    pub fn size(&self) -> usize {
        self.state.lock().active_sessions.len()
    }

    /// Snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.active_sessions_count = state.active_sessions.len();
        stats
    }

    /// Drop every cached and ending session.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.active_sessions.clear();
        state.ending_sessions.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Jobs
    // ─────────────────────────────────────────────────────────────────────

    /// Run a refresh cycle on the calling task.
    ///
    /// Reuses `client` as the operation context when given.
    pub async fn refresh_now(&self, client: Option<&OperationContext>) -> Result<()> {
        self.refresh(client).await
    }

    /// Run a reap cycle on the calling task.
    pub async fn reap_now(&self, client: Option<&OperationContext>) -> Result<()> {
        self.reap(client).await
    }

    /// Stop the periodic jobs and wait for any running invocation.
    pub async fn join_on_shutdown(&self) {
        self.liaison.join().await;
    }

    async fn periodic_refresh(&self) {
        if let Err(e) = self.refresh(None).await {
            warn!(
                error = %e,
                "Failed to refresh session cache, will try again at the next refresh interval"
            );
        }
    }

    async fn periodic_reap(&self) {
        if let Err(e) = self.reap(None).await {
            warn!(
                error = %e,
                "Failed to reap transaction table, will try again at the next refresh interval"
            );
        }
    }

    async fn refresh(&self, client: Option<&OperationContext>) -> Result<()> {
        let started = Instant::now();
        let now = self.liaison.now();
        self.state.lock().stats.begin_refresh(now);
        let _record_duration = on_scope_exit(|| {
            self.state
                .lock()
                .stats
                .last_sessions_collection_job_duration_millis = elapsed_millis(started);
        });

        let ctx = client
            .cloned()
            .unwrap_or_else(|| OperationContext::new(REFRESH_JOB_NAME));
        let _clear_sharding_failure = on_scope_exit(|| ctx.clear_sharding_failure());

        if let Err(e) = self.collection.setup(&ctx).await {
            info!(
                error = %e,
                "Sessions collection is not set up; waiting until next sessions refresh interval"
            );
            return Ok(());
        }

        // Take the live containers; new activity lands in fresh empty ones
        // while this cycle works on the snapshots.
        let (active, ending) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.active_sessions),
                std::mem::take(&mut state.ending_sessions),
            )
        };
        let mut active = ScopeGuard::new(active, |snapshot| self.restore_active(snapshot));
        let ending = ScopeGuard::new(ending, |snapshot| self.restore_ending(snapshot));

        active.retain(|id, _| !ending.contains(id));

        // Sessions of running operations may not be cached; stamp them now.
        let mut to_refresh: HashMap<SessionId, SessionRecord> = active
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        let op_now = self.liaison.now();
        for id in self.liaison.active_op_sessions() {
            if ending.contains(&id) {
                continue;
            }
            to_refresh
                .entry(id)
                .and_modify(|record| {
                    record.touch(op_now);
                })
                .or_insert_with(|| SessionRecord::new(id, op_now));
        }
        let to_refresh: Vec<SessionRecord> = to_refresh.into_values().collect();

        self.collection.refresh_sessions(&ctx, &to_refresh).await?;
        // The collection now holds these; the cache keeps only newer activity.
        active.dismiss();
        let refreshed = to_refresh.len();
        self.state
            .lock()
            .stats
            .last_sessions_collection_job_entries_refreshed = refreshed;

        self.collection.remove_records(&ctx, &ending).await?;
        let ending = ending.dismiss();
        let ended = ending.len();
        self.state
            .lock()
            .stats
            .last_sessions_collection_job_entries_ended = ended;

        // Kill cursors of sessions that are gone. Sessions recreated since
        // the swap are skipped; this is best effort, a cursor can still be
        // reopened under an ending session between these steps.
        let mut cursor_sessions = self.liaison.open_cursor_sessions();
        {
            let state = self.state.lock();
            cursor_sessions.retain(|id| !state.active_sessions.contains_key(id));
        }

        let mut patterns: KillPatternSet = ending.iter().copied().collect();
        if !cursor_sessions.is_empty() {
            match self
                .collection
                .find_removed_sessions(&ctx, &cursor_sessions)
                .await
            {
                Ok(removed) => patterns.extend(removed),
                Err(e) => {
                    debug!(error = %e, "Failed to find removed sessions for cursor cleanup");
                }
            }
        }

        let outcome = self
            .liaison
            .kill_cursors_with_matching_sessions(&ctx, &patterns)
            .await;
        if let Err(e) = &outcome.status {
            warn!(error = %e, "Failed to kill cursors of removed sessions");
        }
        self.state
            .lock()
            .stats
            .last_sessions_collection_job_cursors_closed = outcome.closed;

        debug!(
            refreshed,
            ended,
            cursors_closed = outcome.closed,
            "Refreshed logical session cache"
        );
        Ok(())
    }

    async fn reap(&self, client: Option<&OperationContext>) -> Result<()> {
        let started = Instant::now();
        let now = self.liaison.now();
        self.state.lock().stats.begin_reap(now);
        let _record_duration = on_scope_exit(|| {
            self.state
                .lock()
                .stats
                .last_transaction_reaper_job_duration_millis = elapsed_millis(started);
        });

        let ctx = client
            .cloned()
            .unwrap_or_else(|| OperationContext::new(REAP_JOB_NAME));
        let _clear_sharding_failure = on_scope_exit(|| ctx.clear_sharding_failure());

        if let Err(e) = self.collection.check_exists(&ctx).await {
            info!(
                error = %e,
                "Sessions collection is not set up; waiting until next sessions reap interval"
            );
            return Ok(());
        }

        let lifetime = chrono::Duration::from_std(self.config.transaction_record_minimum_lifetime)
            .map_err(|e| Error::Reap(format!("invalid minimum lifetime: {e}")))?;
        let cutoff = now.checked_sub_signed(lifetime).ok_or_else(|| {
            Error::Reap(format!("minimum lifetime {lifetime} is out of range"))
        })?;

        let removed = (self.reap)(ctx.clone(), Arc::clone(&self.collection), cutoff).await?;
        self.state
            .lock()
            .stats
            .last_transaction_reaper_job_entries_cleaned_up = removed;

        debug!(removed, %cutoff, "Reaped expired transaction records");
        Ok(())
    }

    /// Put an active snapshot back after a failed cycle, merging sessions
    /// that were added in the meantime. The later `last_use` wins.
    fn restore_active(&self, snapshot: HashMap<SessionId, SessionRecord>) {
        let mut state = self.state.lock();
        let interim = std::mem::replace(&mut state.active_sessions, snapshot);
        for (id, record) in interim {
            match state.active_sessions.entry(id) {
                Entry::Occupied(mut existing) => {
                    if record.last_use > existing.get().last_use {
                        existing.insert(record);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }
        debug!(
            count = state.active_sessions.len(),
            "Restored active sessions after failed refresh"
        );
    }

    fn restore_ending(&self, snapshot: HashSet<SessionId>) {
        let mut state = self.state.lock();
        let interim = std::mem::replace(&mut state.ending_sessions, snapshot);
        state.ending_sessions.extend(interim);
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        self.liaison.stop_scheduling();
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
