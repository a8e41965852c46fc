//! Simulate command - runs one scripted workload against a fresh cache.
//!
//! Starts the requested sessions, ends some of them, then runs a refresh
//! and a reap cycle in the foreground. Every session gets a transaction
//! record old enough to be reaped, so the reap cycle removes exactly the
//! ended sessions' records.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use lsc_cache::{
    CacheStats, InMemorySessionsCollection, InMemoryTransactionTable, SessionCache,
    TokioServiceLiaison, transaction_reaper,
};
use lsc_types::{OwnerDigest, SessionId, SessionRecord};
use serde::Serialize;
use tracing::debug;

use super::{Context, print_stats};

/// Arguments for the simulate command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of sessions to start
    #[arg(long, default_value_t = 100)]
    pub sessions: usize,

    /// Number of started sessions to end before the refresh
    #[arg(long, default_value_t = 0)]
    pub end: usize,

    /// Spread sessions across this many owners (0 for anonymous sessions)
    #[arg(long, default_value_t = 0)]
    pub owners: usize,
}

/// Simulation result for JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateOutput {
    sessions_started: usize,
    sessions_ended: usize,
    sessions_per_owner: BTreeMap<String, usize>,
    durable_records: usize,
    transaction_records: usize,
    stats: CacheStats,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    anyhow::ensure!(
        args.end <= args.sessions,
        "cannot end {} sessions when only {} are started",
        args.end,
        args.sessions
    );

    let config = ctx.cache_config().with_refresh_disabled(true);
    let lifetime = chrono::Duration::from_std(config.transaction_record_minimum_lifetime)
        .context("transaction record lifetime out of range")?;

    let collection = Arc::new(InMemorySessionsCollection::new());
    let transactions = Arc::new(InMemoryTransactionTable::new());
    let cache = SessionCache::new(
        config,
        Arc::new(TokioServiceLiaison::new()),
        collection.clone(),
        transaction_reaper(transactions.clone()),
    );

    let owners: Vec<(String, OwnerDigest)> = (0..args.owners)
        .map(|i| {
            let name = format!("user{i}");
            let digest = OwnerDigest::of(&name);
            (name, digest)
        })
        .collect();

    let now = Utc::now();
    let stale = lifetime
        .checked_add(&chrono::Duration::minutes(1))
        .and_then(|age| now.checked_sub_signed(age))
        .context("transaction record lifetime out of range")?;
    let mut started = Vec::with_capacity(args.sessions);
    for i in 0..args.sessions {
        let record = match owners.get(i % owners.len().max(1)) {
            Some((name, digest)) => {
                SessionRecord::new(SessionId::owned_by(*digest), now).with_user(name.clone())
            }
            None => SessionRecord::new(SessionId::new(), now),
        };
        let id = record.id;
        cache
            .start_session(record)
            .with_context(|| format!("failed to start session {} of {}", i + 1, args.sessions))?;
        transactions.record_write(id, stale);
        started.push(id);
    }

    let sessions_per_owner = owners
        .iter()
        .map(|(name, digest)| {
            let count = cache.list_ids_for_owners(&HashSet::from([*digest])).len();
            (name.clone(), count)
        })
        .collect();

    cache.end_sessions(started.iter().take(args.end).copied());
    debug!(started = started.len(), ended = args.end, "Workload applied");

    cache.refresh_now(None).await.context("refresh failed")?;
    cache.reap_now(None).await.context("reap failed")?;

    let output = SimulateOutput {
        sessions_started: started.len(),
        sessions_ended: args.end,
        sessions_per_owner,
        durable_records: collection.len(),
        transaction_records: transactions.len(),
        stats: cache.stats(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_stats("Simulation", &output.stats);
        println!("  {:<28} {}", "Durable session records:", output.durable_records);
        println!("  {:<28} {}", "Transaction records:", output.transaction_records);
        for (owner, count) in &output.sessions_per_owner {
            println!("  {:<28} {}", format!("Sessions of {owner}:"), count);
        }
        println!();
    }

    Ok(())
}
