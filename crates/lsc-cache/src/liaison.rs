//! The cache's view of the hosting service.
//!
//! [`ServiceLiaison`] supplies the clock, runs the periodic jobs, and
//! reports which sessions are attached to running operations and open
//! cursors. [`TokioServiceLiaison`] is the in-process implementation: it
//! drives jobs with tokio intervals and tracks activity in an
//! [`ActivityRegistry`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use lsc_types::{KillPatternSet, SessionId};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::operation::OperationContext;

// ─────────────────────────────────────────────────────────────────────────────
// Periodic jobs
// ─────────────────────────────────────────────────────────────────────────────

/// Callback invoked on every tick of a periodic job.
pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A named job run at a fixed interval.
#[derive(Clone)]
pub struct PeriodicJob {
    pub name: String,
    pub interval: Duration,
    pub task: JobTask,
}

impl PeriodicJob {
    /// Create a job from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            task: Arc::new(move || Box::pin(task())),
        }
    }

    /// Run one invocation of the job.
    pub async fn run(&self) {
        (self.task)().await
    }
}

impl std::fmt::Debug for PeriodicJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicJob")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Result of a batched cursor kill.
#[derive(Debug)]
pub struct CursorKillOutcome {
    /// First error hit while killing, if any.
    pub status: Result<()>,
    /// Number of cursors that were closed.
    pub closed: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Liaison trait
// ─────────────────────────────────────────────────────────────────────────────

/// Capability interface to the hosting service.
#[async_trait]
pub trait ServiceLiaison: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Run `job` every `job.interval` until shutdown.
    fn schedule_job(&self, job: PeriodicJob);

    /// Sessions attached to operations currently running on this node.
    fn active_op_sessions(&self) -> HashSet<SessionId>;

    /// Sessions that own at least one open cursor on this node.
    fn open_cursor_sessions(&self) -> HashSet<SessionId>;

    /// Kill every open cursor whose session matches `patterns`.
    async fn kill_cursors_with_matching_sessions(
        &self,
        ctx: &OperationContext,
        patterns: &KillPatternSet,
    ) -> CursorKillOutcome;

    /// Stop starting new job invocations. Does not wait.
    fn stop_scheduling(&self);

    /// Stop scheduling and wait for any in-flight job invocation to finish.
    async fn join(&self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Activity registry
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of an open cursor.
pub type CursorId = u64;

#[derive(Debug, Default)]
struct RegistryState {
    next_op: u64,
    operations: HashMap<u64, SessionId>,
    next_cursor: CursorId,
    cursors: HashMap<CursorId, SessionId>,
}

/// Tracks running operations and open cursors by session.
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    state: Mutex<RegistryState>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running operation for `session`. The operation ends when
    /// the returned guard is dropped.
    pub fn begin_operation(self: &Arc<Self>, session: SessionId) -> OperationGuard {
        let mut state = self.state.lock();
        state.next_op += 1;
        let op = state.next_op;
        state.operations.insert(op, session);
        OperationGuard {
            registry: Arc::clone(self),
            op,
        }
    }

    /// Register a cursor opened under `session`.
    pub fn open_cursor(&self, session: SessionId) -> CursorId {
        let mut state = self.state.lock();
        state.next_cursor += 1;
        let cursor = state.next_cursor;
        state.cursors.insert(cursor, session);
        cursor
    }

    /// Close a cursor. Returns false if it was not open.
    pub fn close_cursor(&self, cursor: CursorId) -> bool {
        self.state.lock().cursors.remove(&cursor).is_some()
    }

    /// Whether a cursor is still open.
    pub fn is_cursor_open(&self, cursor: CursorId) -> bool {
        self.state.lock().cursors.contains_key(&cursor)
    }

    pub fn cursor_count(&self) -> usize {
        self.state.lock().cursors.len()
    }

    pub fn active_op_sessions(&self) -> HashSet<SessionId> {
        self.state.lock().operations.values().copied().collect()
    }

    pub fn open_cursor_sessions(&self) -> HashSet<SessionId> {
        self.state.lock().cursors.values().copied().collect()
    }

    /// Close every cursor matching `patterns`, returning how many closed.
    pub fn kill_matching(&self, patterns: &KillPatternSet) -> usize {
        let mut state = self.state.lock();
        let before = state.cursors.len();
        state.cursors.retain(|_, session| !patterns.matches(session));
        before - state.cursors.len()
    }
}

/// Keeps an operation registered while alive.
#[derive(Debug)]
pub struct OperationGuard {
    registry: Arc<ActivityRegistry>,
    op: u64,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.registry.state.lock().operations.remove(&self.op);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokio liaison
// ─────────────────────────────────────────────────────────────────────────────

/// Liaison running jobs on the ambient tokio runtime.
#[derive(Debug, Default)]
pub struct TokioServiceLiaison {
    registry: Arc<ActivityRegistry>,
    shutdown: CancellationToken,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioServiceLiaison {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing activity registry.
    pub fn with_registry(registry: Arc<ActivityRegistry>) -> Self {
        Self {
            registry,
            ..Default::default()
        }
    }

    /// The registry of running operations and open cursors.
    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ServiceLiaison for TokioServiceLiaison {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule_job(&self, job: PeriodicJob) {
        if self.shutdown.is_cancelled() {
            debug!(job = %job.name, "Liaison shutting down, not scheduling job");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(job = %job.name, "No tokio runtime available, job not scheduled");
            return;
        };

        let token = self.shutdown.clone();
        debug!(job = %job.name, interval_ms = job.interval.as_millis() as u64, "Scheduling periodic job");

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + job.interval, job.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!(job = %job.name, "Running periodic job");
                        job.run().await;
                    }
                }
            }
            debug!(job = %job.name, "Periodic job stopped");
        });

        self.jobs.lock().push(handle);
    }

    fn active_op_sessions(&self) -> HashSet<SessionId> {
        self.registry.active_op_sessions()
    }

    fn open_cursor_sessions(&self) -> HashSet<SessionId> {
        self.registry.open_cursor_sessions()
    }

    async fn kill_cursors_with_matching_sessions(
        &self,
        _ctx: &OperationContext,
        patterns: &KillPatternSet,
    ) -> CursorKillOutcome {
        let closed = self.registry.kill_matching(patterns);
        CursorKillOutcome {
            status: Ok(()),
            closed,
        }
    }

    fn stop_scheduling(&self) {
        self.shutdown.cancel();
    }

    async fn join(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.jobs.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Periodic job task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsc_types::{KillPattern, OwnerDigest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_operation_guard_unregisters_on_drop() {
        let registry = Arc::new(ActivityRegistry::new());
        let session = SessionId::new();

        let guard = registry.begin_operation(session);
        assert!(registry.active_op_sessions().contains(&session));

        drop(guard);
        assert!(registry.active_op_sessions().is_empty());
    }

    #[test]
    fn test_kill_matching_closes_only_matching_cursors() {
        let registry = ActivityRegistry::new();
        let alice = OwnerDigest::of("alice");
        let a1 = SessionId::owned_by(alice);
        let a2 = SessionId::owned_by(alice);
        let b = SessionId::owned_by(OwnerDigest::of("bob"));

        let c1 = registry.open_cursor(a1);
        let c2 = registry.open_cursor(a2);
        let c3 = registry.open_cursor(b);

        let patterns: KillPatternSet = [KillPattern::Owner(alice)].into_iter().collect();
        assert_eq!(registry.kill_matching(&patterns), 2);
        assert!(!registry.is_cursor_open(c1));
        assert!(!registry.is_cursor_open(c2));
        assert!(registry.is_cursor_open(c3));
        assert_eq!(registry.open_cursor_sessions(), HashSet::from([b]));
    }

    #[tokio::test]
    async fn test_shared_registry_feeds_liaison() {
        let registry = Arc::new(ActivityRegistry::new());
        let liaison = TokioServiceLiaison::with_registry(Arc::clone(&registry));
        let closed = SessionId::new();
        let open = SessionId::new();

        let cursor = registry.open_cursor(closed);
        registry.open_cursor(open);
        assert!(registry.close_cursor(cursor));
        assert!(!registry.close_cursor(cursor));

        assert_eq!(liaison.open_cursor_sessions(), HashSet::from([open]));
        let _op = registry.begin_operation(closed);
        assert_eq!(liaison.active_op_sessions(), HashSet::from([closed]));

        let patterns: KillPatternSet = [KillPattern::Session(open)].into_iter().collect();
        let outcome = liaison
            .kill_cursors_with_matching_sessions(&OperationContext::new("test"), &patterns)
            .await;
        assert!(outcome.status.is_ok());
        assert_eq!(outcome.closed, 1);
        assert_eq!(registry.cursor_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_job_runs_until_join() {
        let liaison = TokioServiceLiaison::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        liaison.schedule_job(PeriodicJob::new("count", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        liaison.join().await;
        let after_join = runs.load(Ordering::SeqCst);
        assert_eq!(after_join, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_join);
    }

    #[tokio::test]
    async fn test_no_scheduling_after_stop() {
        let liaison = TokioServiceLiaison::new();
        liaison.stop_scheduling();
        liaison.schedule_job(PeriodicJob::new("noop", Duration::from_secs(1), || async {}));
        assert!(liaison.jobs.lock().is_empty());
    }
}
