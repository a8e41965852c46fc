//! The durable, shared sessions collection.
//!
//! The cache never owns the collection: other nodes write to the same
//! records concurrently, so every operation here is an idempotent upsert or
//! delete keyed by session id.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lsc_types::{SessionId, SessionRecord};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::operation::OperationContext;

/// Name reported when the in-memory collection is not provisioned.
pub const SESSIONS_NAMESPACE: &str = "config.system.sessions";

/// Capability interface for the durable sessions collection.
#[async_trait]
pub trait SessionsCollection: Send + Sync {
    /// Check that the collection exists. Returns [`Error::NamespaceNotFound`]
    /// while it has not been provisioned.
    async fn check_exists(&self, ctx: &OperationContext) -> Result<()>;

    /// Ensure the collection exists and is ready for writes.
    async fn setup(&self, ctx: &OperationContext) -> Result<()>;

    /// Upsert each record by id, bumping its last-use timestamp.
    async fn refresh_sessions(&self, ctx: &OperationContext, records: &[SessionRecord])
    -> Result<()>;

    /// Delete the records for the given ids.
    async fn remove_records(&self, ctx: &OperationContext, ids: &HashSet<SessionId>) -> Result<()>;

    /// Return the subset of `ids` that no longer has a record.
    async fn find_removed_sessions(
        &self,
        ctx: &OperationContext,
        ids: &HashSet<SessionId>,
    ) -> Result<HashSet<SessionId>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory collection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CollectionState {
    provisioned: bool,
    records: HashMap<SessionId, SessionRecord>,
}

/// Process-local sessions collection.
///
/// Starts unprovisioned, like a cluster that has not created the sessions
/// collection yet. With a session timeout configured, records idle for
/// longer than the timeout are dropped the next time the collection is
/// touched, mirroring a TTL index.
#[derive(Debug, Default)]
pub struct InMemorySessionsCollection {
    state: Mutex<CollectionState>,
    session_timeout: Option<Duration>,
}

impl InMemorySessionsCollection {
    /// Create an unprovisioned collection without expiry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire records idle for longer than `timeout`.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Whether `setup` has run.
    pub fn is_provisioned(&self) -> bool {
        self.state.lock().provisioned
    }

    /// Number of stored records, after expiry.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        self.expire(&mut state);
        state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a stored record.
    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        let mut state = self.state.lock();
        self.expire(&mut state);
        state.records.get(id).cloned()
    }

    fn expire(&self, state: &mut CollectionState) {
        let Some(timeout) = self.session_timeout else {
            return;
        };
        // A timeout reaching past the earliest representable time expires nothing
        let Some(cutoff) = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
        else {
            return;
        };
        let before = state.records.len();
        state.records.retain(|_, record| record.last_use >= cutoff);
        let expired = before - state.records.len();
        if expired > 0 {
            debug!(count = expired, "Expired idle session records");
        }
    }

    fn provisioned(state: &CollectionState) -> Result<()> {
        if state.provisioned {
            Ok(())
        } else {
            Err(Error::NamespaceNotFound(SESSIONS_NAMESPACE.to_string()))
        }
    }
}

#[async_trait]
impl SessionsCollection for InMemorySessionsCollection {
    async fn check_exists(&self, _ctx: &OperationContext) -> Result<()> {
        Self::provisioned(&self.state.lock())
    }

    async fn setup(&self, _ctx: &OperationContext) -> Result<()> {
        let mut state = self.state.lock();
        if !state.provisioned {
            debug!(namespace = SESSIONS_NAMESPACE, "Creating sessions collection");
            state.provisioned = true;
        }
        Ok(())
    }

    async fn refresh_sessions(
        &self,
        _ctx: &OperationContext,
        records: &[SessionRecord],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::provisioned(&state)?;
        self.expire(&mut state);

        for record in records {
            state
                .records
                .entry(record.id)
                .and_modify(|existing| {
                    existing.touch(record.last_use);
                    if record.user.is_some() {
                        existing.user = record.user.clone();
                    }
                })
                .or_insert_with(|| record.clone());
        }

        trace!(count = records.len(), "Refreshed session records");
        Ok(())
    }

    async fn remove_records(&self, _ctx: &OperationContext, ids: &HashSet<SessionId>) -> Result<()> {
        let mut state = self.state.lock();
        Self::provisioned(&state)?;

        for id in ids {
            state.records.remove(id);
        }

        trace!(count = ids.len(), "Removed session records");
        Ok(())
    }

    async fn find_removed_sessions(
        &self,
        _ctx: &OperationContext,
        ids: &HashSet<SessionId>,
    ) -> Result<HashSet<SessionId>> {
        let mut state = self.state.lock();
        Self::provisioned(&state)?;
        self.expire(&mut state);

        Ok(ids
            .iter()
            .filter(|id| !state.records.contains_key(id))
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> OperationContext {
        OperationContext::new("test")
    }

    #[tokio::test]
    async fn test_unprovisioned_until_setup() {
        let coll = InMemorySessionsCollection::new();
        let err = coll.check_exists(&ctx()).await.unwrap_err();
        assert!(err.is_not_provisioned());

        let record = SessionRecord::new(SessionId::new(), Utc::now());
        assert!(coll.refresh_sessions(&ctx(), &[record]).await.is_err());

        coll.setup(&ctx()).await.unwrap();
        coll.check_exists(&ctx()).await.unwrap();
        assert!(coll.is_provisioned());
    }

    #[tokio::test]
    async fn test_refresh_keeps_latest_last_use() {
        let coll = InMemorySessionsCollection::new();
        coll.setup(&ctx()).await.unwrap();

        let id = SessionId::new();
        let now = Utc::now();
        let older = now - chrono::Duration::minutes(5);

        coll.refresh_sessions(&ctx(), &[SessionRecord::new(id, now)])
            .await
            .unwrap();
        coll.refresh_sessions(&ctx(), &[SessionRecord::new(id, older)])
            .await
            .unwrap();

        assert_eq!(coll.len(), 1);
        assert_eq!(coll.get(&id).unwrap().last_use, now);
    }

    #[tokio::test]
    async fn test_find_removed_sessions() {
        let coll = InMemorySessionsCollection::new();
        coll.setup(&ctx()).await.unwrap();

        let kept = SessionId::new();
        let removed = SessionId::new();
        let never = SessionId::new();
        coll.refresh_sessions(
            &ctx(),
            &[
                SessionRecord::new(kept, Utc::now()),
                SessionRecord::new(removed, Utc::now()),
            ],
        )
        .await
        .unwrap();
        coll.remove_records(&ctx(), &HashSet::from([removed]))
            .await
            .unwrap();

        let found = coll
            .find_removed_sessions(&ctx(), &HashSet::from([kept, removed, never]))
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([removed, never]));
    }

    #[tokio::test]
    async fn test_session_timeout_expires_idle_records() {
        let coll = InMemorySessionsCollection::new().with_session_timeout(Duration::from_secs(60));
        coll.setup(&ctx()).await.unwrap();

        let idle = SessionId::new();
        let fresh = SessionId::new();
        coll.refresh_sessions(
            &ctx(),
            &[
                SessionRecord::new(idle, Utc::now() - chrono::Duration::minutes(10)),
                SessionRecord::new(fresh, Utc::now()),
            ],
        )
        .await
        .unwrap();

        assert!(coll.get(&idle).is_none());
        assert!(coll.get(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_expires_nothing() {
        let coll = InMemorySessionsCollection::new()
            .with_session_timeout(Duration::from_secs(200_000_000_000 * 60));
        coll.setup(&ctx()).await.unwrap();

        let ancient = SessionId::new();
        coll.refresh_sessions(
            &ctx(),
            &[SessionRecord::new(ancient, Utc::now() - chrono::Duration::days(365))],
        )
        .await
        .unwrap();

        assert!(coll.get(&ancient).is_some());
    }
}
