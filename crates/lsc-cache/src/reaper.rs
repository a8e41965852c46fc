//! Reap strategies for expired transaction records.
//!
//! The cache calls a [`ReapSessionsOlderThan`] function value once per
//! reap cycle. [`transaction_reaper`] is the standard strategy: it only
//! deletes transaction records whose session has also disappeared from the
//! sessions collection, so a session that is still alive elsewhere in the
//! cluster keeps its transaction history.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use lsc_types::SessionId;
use parking_lot::Mutex;
use tracing::debug;

use crate::collection::SessionsCollection;
use crate::error::{Error, Result};
use crate::operation::OperationContext;

/// Deletes durable state for sessions last used before the cutoff and
/// returns how many entries were removed.
pub type ReapSessionsOlderThan = Arc<
    dyn Fn(
            OperationContext,
            Arc<dyn SessionsCollection>,
            DateTime<Utc>,
        ) -> BoxFuture<'static, Result<usize>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a reap strategy.
pub fn reap_fn<F, Fut>(f: F) -> ReapSessionsOlderThan
where
    F: Fn(OperationContext, Arc<dyn SessionsCollection>, DateTime<Utc>) -> Fut
        + Send
        + Sync
        + 'static,
    Fut: Future<Output = Result<usize>> + Send + 'static,
{
    Arc::new(
        move |ctx: OperationContext,
              collection: Arc<dyn SessionsCollection>,
              cutoff: DateTime<Utc>|
              -> BoxFuture<'static, Result<usize>> { Box::pin(f(ctx, collection, cutoff)) },
    )
}

/// A strategy that never removes anything.
pub fn noop_reaper() -> ReapSessionsOlderThan {
    reap_fn(|_ctx, _collection, _cutoff| async { Ok(0) })
}

/// Storage of per-session transaction records.
#[async_trait]
pub trait TransactionTable: Send + Sync {
    /// Sessions whose transaction record was last written before `cutoff`.
    async fn find_older_than(
        &self,
        ctx: &OperationContext,
        cutoff: DateTime<Utc>,
    ) -> Result<HashSet<SessionId>>;

    /// Delete the transaction records of `sessions`. Returns how many
    /// records existed and were deleted.
    async fn remove(&self, ctx: &OperationContext, sessions: &HashSet<SessionId>) -> Result<usize>;
}

/// Reap strategy backed by a transaction table.
pub fn transaction_reaper(table: Arc<dyn TransactionTable>) -> ReapSessionsOlderThan {
    reap_fn(move |ctx, collection, cutoff| {
        let table = Arc::clone(&table);
        async move {
            let candidates = table.find_older_than(&ctx, cutoff).await?;
            if candidates.is_empty() {
                return Ok(0);
            }

            let expired = collection
                .find_removed_sessions(&ctx, &candidates)
                .await
                .map_err(|e| Error::Reap(format!("failed to look up expired sessions: {e}")))?;
            if expired.is_empty() {
                debug!(
                    candidates = candidates.len(),
                    "No expired sessions among old transaction records"
                );
                return Ok(0);
            }

            let removed = table.remove(&ctx, &expired).await?;
            debug!(
                candidates = candidates.len(),
                removed, "Reaped transaction records"
            );
            Ok(removed)
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory transaction table
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local transaction table keyed by session.
#[derive(Debug, Default)]
pub struct InMemoryTransactionTable {
    last_writes: Mutex<HashMap<SessionId, DateTime<Utc>>>,
}

impl InMemoryTransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction write for `session` at `at`.
    pub fn record_write(&self, session: SessionId, at: DateTime<Utc>) {
        self.last_writes
            .lock()
            .entry(session)
            .and_modify(|last| *last = (*last).max(at))
            .or_insert(at);
    }

    pub fn contains(&self, session: &SessionId) -> bool {
        self.last_writes.lock().contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.last_writes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_writes.lock().is_empty()
    }
}

#[async_trait]
impl TransactionTable for InMemoryTransactionTable {
    async fn find_older_than(
        &self,
        _ctx: &OperationContext,
        cutoff: DateTime<Utc>,
    ) -> Result<HashSet<SessionId>> {
        Ok(self
            .last_writes
            .lock()
            .iter()
            .filter(|(_, last)| **last < cutoff)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn remove(&self, _ctx: &OperationContext, sessions: &HashSet<SessionId>) -> Result<usize> {
        let mut last_writes = self.last_writes.lock();
        Ok(sessions
            .iter()
            .filter(|id| last_writes.remove(id).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::InMemorySessionsCollection;
    use chrono::Duration;
    use lsc_types::SessionRecord;

    #[tokio::test]
    async fn test_reaps_only_old_records_of_removed_sessions() {
        let ctx = OperationContext::new("test");
        let now = Utc::now();

        let collection: Arc<dyn SessionsCollection> = Arc::new(InMemorySessionsCollection::new());
        collection.setup(&ctx).await.unwrap();

        let alive = SessionId::new();
        let gone = SessionId::new();
        let recent = SessionId::new();
        collection
            .refresh_sessions(&ctx, &[SessionRecord::new(alive, now)])
            .await
            .unwrap();

        let table = Arc::new(InMemoryTransactionTable::new());
        table.record_write(alive, now - Duration::hours(2));
        table.record_write(gone, now - Duration::hours(2));
        table.record_write(recent, now);

        let reap = transaction_reaper(table.clone());
        let removed = reap(ctx, collection, now - Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(table.contains(&alive));
        assert!(!table.contains(&gone));
        assert!(table.contains(&recent));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported() {
        let ctx = OperationContext::new("test");
        // never set up, so the lookup fails
        let collection: Arc<dyn SessionsCollection> = Arc::new(InMemorySessionsCollection::new());

        let table = Arc::new(InMemoryTransactionTable::new());
        table.record_write(SessionId::new(), Utc::now() - Duration::hours(1));

        let reap = transaction_reaper(table.clone());
        let err = reap(ctx, collection, Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::Reap(_)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_reaper() {
        let reap = noop_reaper();
        let collection: Arc<dyn SessionsCollection> = Arc::new(InMemorySessionsCollection::new());
        let removed = reap(OperationContext::new("test"), collection, Utc::now())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
