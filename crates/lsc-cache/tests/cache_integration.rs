//! Integration tests for SessionCache running on the tokio liaison.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lsc_cache::{
    CacheConfig, InMemorySessionsCollection, InMemoryTransactionTable, SessionCache,
    ServiceLiaison, TokioServiceLiaison, noop_reaper, transaction_reaper,
};
use lsc_types::{SessionId, SessionRecord};

/// Helper to build a cache refreshing every second.
fn test_cache() -> (
    Arc<TokioServiceLiaison>,
    Arc<InMemorySessionsCollection>,
    Arc<SessionCache>,
) {
    let liaison = Arc::new(TokioServiceLiaison::new());
    let collection = Arc::new(InMemorySessionsCollection::new());
    let config = CacheConfig::default().with_refresh_interval(Duration::from_secs(1));
    let cache = SessionCache::new(config, liaison.clone(), collection.clone(), noop_reaper());
    (liaison, collection, cache)
}

#[tokio::test(start_paused = true)]
async fn test_periodic_refresh_writes_sessions() {
    let (_liaison, collection, cache) = test_cache();
    let id = SessionId::new();
    cache.vivify(&id).unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(collection.is_provisioned());
    assert!(collection.get(&id).is_some());
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.stats().sessions_collection_job_count, 1);

    cache.join_on_shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ended_session_loses_cursors() {
    let (liaison, collection, cache) = test_cache();
    let ended = SessionId::new();
    let kept = SessionId::new();
    cache.refresh_sessions(&[ended, kept]).unwrap();

    let registry = liaison.registry();
    let ended_cursor = registry.open_cursor(ended);
    let kept_cursor = registry.open_cursor(kept);

    // first cycle persists both sessions
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(collection.get(&ended).is_some());

    cache.end_sessions([ended]);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(collection.get(&ended).is_none());
    assert!(!registry.is_cursor_open(ended_cursor));
    assert!(registry.is_cursor_open(kept_cursor));
    assert_eq!(cache.stats().last_sessions_collection_job_cursors_closed, 1);

    cache.join_on_shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_running_operation_keeps_session_alive() {
    let (liaison, collection, cache) = test_cache();
    let session = SessionId::new();

    let op = liaison.registry().begin_operation(session);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(collection.get(&session).is_some());
    drop(op);

    assert!(liaison.active_op_sessions().is_empty());
    cache.join_on_shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_cycles_after_shutdown() {
    let (_liaison, _collection, cache) = test_cache();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    cache.join_on_shutdown().await;
    let runs = cache.stats().sessions_collection_job_count;
    assert_eq!(runs, 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.stats().sessions_collection_job_count, runs);
}

#[tokio::test]
async fn test_transaction_reaper_end_to_end() {
    let liaison = Arc::new(TokioServiceLiaison::new());
    let collection = Arc::new(InMemorySessionsCollection::new());
    let table = Arc::new(InMemoryTransactionTable::new());
    let config = CacheConfig::default()
        .with_refresh_disabled(true)
        .with_transaction_record_minimum_lifetime(Duration::from_secs(30 * 60));
    let cache = SessionCache::new(
        config,
        liaison,
        collection.clone(),
        transaction_reaper(table.clone()),
    );

    // reaping before the collection exists is a no-op
    table.record_write(SessionId::new(), Utc::now() - chrono::Duration::hours(2));
    cache.reap_now(None).await.unwrap();
    assert_eq!(table.len(), 1);

    let alive = SessionId::new();
    let recent = SessionId::new();
    table.record_write(alive, Utc::now() - chrono::Duration::hours(2));
    table.record_write(recent, Utc::now());
    cache
        .refresh_records(&[SessionRecord::new(alive, Utc::now())])
        .unwrap();
    cache.refresh_now(None).await.unwrap();

    cache.reap_now(None).await.unwrap();

    assert!(table.contains(&alive));
    assert!(table.contains(&recent));
    assert_eq!(table.len(), 2);
    assert_eq!(cache.stats().last_transaction_reaper_job_entries_cleaned_up, 1);
}

#[tokio::test]
async fn test_stats_serialize_with_server_status_names() {
    let (_liaison, _collection, cache) = test_cache();
    cache.vivify(&SessionId::new()).unwrap();

    let json = serde_json::to_value(cache.stats()).unwrap();
    assert_eq!(json["activeSessionsCount"], 1);
    assert_eq!(json["sessionsCollectionJobCount"], 0);
    assert!(json.get("lastTransactionReaperJobEntriesCleanedUp").is_some());

    cache.join_on_shutdown().await;
}
