//! Test doubles for the cache's collaborators.
//!
//! [`MockServiceLiaison`] has a settable clock, keeps scheduled jobs for
//! manual execution, and records cursor kill requests.
//! [`MockSessionsCollection`] stores records in memory, records every call,
//! and can be told to fail any operation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lsc_types::{KillPatternSet, SessionId, SessionRecord};
use parking_lot::Mutex;

use crate::collection::SessionsCollection;
use crate::error::{Error, Result};
use crate::liaison::{CursorKillOutcome, PeriodicJob, ServiceLiaison};
use crate::operation::OperationContext;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Liaison
// ─────────────────────────────────────────────────────────────────────────────

/// Liaison whose jobs only run when asked to.
#[derive(Debug)]
pub struct MockServiceLiaison {
    now: Mutex<DateTime<Utc>>,
    jobs: Mutex<Vec<PeriodicJob>>,
    active_ops: Mutex<HashSet<SessionId>>,
    cursors: Mutex<HashMap<SessionId, usize>>,
    kill_requests: Mutex<Vec<KillPatternSet>>,
    kill_error: Mutex<Option<Error>>,
    stopped: AtomicBool,
    joins: AtomicUsize,
}

impl Default for MockServiceLiaison {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServiceLiaison {
    /// Create a liaison whose clock starts at the current time.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
            jobs: Mutex::new(Vec::new()),
            active_ops: Mutex::new(HashSet::new()),
            cursors: Mutex::new(HashMap::new()),
            kill_requests: Mutex::new(Vec::new()),
            kill_error: Mutex::new(None),
            stopped: AtomicBool::new(false),
            joins: AtomicUsize::new(0),
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    /// Names and intervals of the scheduled jobs.
    pub fn scheduled_jobs(&self) -> Vec<(String, Duration)> {
        self.jobs
            .lock()
            .iter()
            .map(|job| (job.name.clone(), job.interval))
            .collect()
    }

    /// Run every scheduled job once, in scheduling order.
    pub async fn run_scheduled_jobs(&self) {
        let jobs = self.jobs.lock().clone();
        for job in jobs {
            job.run().await;
        }
    }

    /// Attach a running operation to `session`.
    pub fn add_active_op_session(&self, session: SessionId) {
        self.active_ops.lock().insert(session);
    }

    pub fn clear_active_op_sessions(&self) {
        self.active_ops.lock().clear();
    }

    /// Open a cursor under `session`.
    pub fn open_cursor(&self, session: SessionId) {
        *self.cursors.lock().entry(session).or_insert(0) += 1;
    }

    /// Number of open cursors under `session`.
    pub fn cursor_count(&self, session: &SessionId) -> usize {
        self.cursors.lock().get(session).copied().unwrap_or(0)
    }

    /// Every pattern set passed to the kill call, in order.
    pub fn kill_requests(&self) -> Vec<KillPatternSet> {
        self.kill_requests.lock().clone()
    }

    /// Make kill calls report `error` (cursors are still closed).
    pub fn set_kill_error(&self, error: Option<Error>) {
        *self.kill_error.lock() = error;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceLiaison for MockServiceLiaison {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn schedule_job(&self, job: PeriodicJob) {
        self.jobs.lock().push(job);
    }

    fn active_op_sessions(&self) -> HashSet<SessionId> {
        self.active_ops.lock().clone()
    }

    fn open_cursor_sessions(&self) -> HashSet<SessionId> {
        self.cursors.lock().keys().copied().collect()
    }

    async fn kill_cursors_with_matching_sessions(
        &self,
        _ctx: &OperationContext,
        patterns: &KillPatternSet,
    ) -> CursorKillOutcome {
        self.kill_requests.lock().push(patterns.clone());

        let mut cursors = self.cursors.lock();
        let mut closed = 0;
        cursors.retain(|session, count| {
            if patterns.matches(session) {
                closed += *count;
                false
            } else {
                true
            }
        });

        let status = match self.kill_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        CursorKillOutcome { status, closed }
    }

    fn stop_scheduling(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn join(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.joins.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Sessions Collection
// ─────────────────────────────────────────────────────────────────────────────

type RefreshHook = Box<dyn Fn() + Send + Sync>;

/// Sessions collection with call recording and failure injection.
#[derive(Default)]
pub struct MockSessionsCollection {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
    check_exists_error: Mutex<Option<Error>>,
    refresh_error: Mutex<Option<Error>>,
    remove_error: Mutex<Option<Error>>,
    find_removed_error: Mutex<Option<Error>>,
    refresh_calls: Mutex<Vec<Vec<SessionRecord>>>,
    remove_calls: Mutex<Vec<HashSet<SessionId>>>,
    find_removed_calls: AtomicUsize,
    setup_calls: AtomicUsize,
    on_refresh: Mutex<Option<RefreshHook>>,
    sharding_failure_on_refresh: Mutex<Option<String>>,
}

impl MockSessionsCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `check_exists` and `setup` with `error`.
    pub fn set_check_exists_error(&self, error: Option<Error>) {
        *self.check_exists_error.lock() = error;
    }

    pub fn set_refresh_error(&self, error: Option<Error>) {
        *self.refresh_error.lock() = error;
    }

    pub fn set_remove_error(&self, error: Option<Error>) {
        *self.remove_error.lock() = error;
    }

    pub fn set_find_removed_error(&self, error: Option<Error>) {
        *self.find_removed_error.lock() = error;
    }

    /// Run `hook` at the start of every `refresh_sessions` call, before any
    /// injected failure. Used to simulate concurrent cache activity.
    pub fn on_refresh(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_refresh.lock() = Some(Box::new(hook));
    }

    /// Record a sharding failure on the operation during `refresh_sessions`.
    pub fn set_sharding_failure_on_refresh(&self, reason: Option<String>) {
        *self.sharding_failure_on_refresh.lock() = reason;
    }

    /// Seed a durable record directly.
    pub fn insert_record(&self, record: SessionRecord) {
        self.records.lock().insert(record.id, record);
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.records.lock().contains_key(id)
    }

    pub fn record(&self, id: &SessionId) -> Option<SessionRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn refresh_calls(&self) -> Vec<Vec<SessionRecord>> {
        self.refresh_calls.lock().clone()
    }

    pub fn remove_calls(&self) -> Vec<HashSet<SessionId>> {
        self.remove_calls.lock().clone()
    }

    pub fn find_removed_calls(&self) -> usize {
        self.find_removed_calls.load(Ordering::SeqCst)
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    fn injected(slot: &Mutex<Option<Error>>) -> Result<()> {
        match slot.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionsCollection for MockSessionsCollection {
    async fn check_exists(&self, _ctx: &OperationContext) -> Result<()> {
        Self::injected(&self.check_exists_error)
    }

    async fn setup(&self, _ctx: &OperationContext) -> Result<()> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.check_exists_error)
    }

    async fn refresh_sessions(
        &self,
        ctx: &OperationContext,
        records: &[SessionRecord],
    ) -> Result<()> {
        if let Some(hook) = self.on_refresh.lock().as_ref() {
            hook();
        }
        if let Some(reason) = self.sharding_failure_on_refresh.lock().clone() {
            ctx.set_sharding_failure(reason);
        }
        self.refresh_calls.lock().push(records.to_vec());
        Self::injected(&self.refresh_error)?;

        let mut stored = self.records.lock();
        for record in records {
            stored
                .entry(record.id)
                .and_modify(|existing| {
                    existing.touch(record.last_use);
                })
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn remove_records(&self, _ctx: &OperationContext, ids: &HashSet<SessionId>) -> Result<()> {
        self.remove_calls.lock().push(ids.clone());
        Self::injected(&self.remove_error)?;

        let mut stored = self.records.lock();
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn find_removed_sessions(
        &self,
        _ctx: &OperationContext,
        ids: &HashSet<SessionId>,
    ) -> Result<HashSet<SessionId>> {
        self.find_removed_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.find_removed_error)?;

        let stored = self.records.lock();
        Ok(ids
            .iter()
            .filter(|id| !stored.contains_key(id))
            .copied()
            .collect())
    }
}
