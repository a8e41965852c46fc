//! Run command - starts a cache node and runs until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use lsc_cache::{
    InMemorySessionsCollection, InMemoryTransactionTable, SessionCache, TokioServiceLiaison,
    transaction_reaper,
};
use lsc_types::SessionId;
use tracing::{info, warn};

use super::{Context, print_stats};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Refresh interval in milliseconds (overrides config)
    #[arg(long)]
    pub refresh_millis: Option<u64>,

    /// Maximum cached sessions (overrides config)
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Number of sessions to vivify at startup
    #[arg(long, default_value_t = 0)]
    pub sessions: usize,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let session = ctx.loaded.config.session_or_default();
    let mut config = ctx.cache_config();
    if let Some(millis) = args.refresh_millis {
        anyhow::ensure!(millis > 0, "--refresh-millis must be positive");
        config = config.with_refresh_interval(Duration::from_millis(millis));
    }
    if let Some(max) = args.max_sessions {
        anyhow::ensure!(max > 0, "--max-sessions must be at least 1");
        config = config.with_max_sessions(max);
    }

    let liaison = Arc::new(TokioServiceLiaison::new());
    let collection = Arc::new(
        InMemorySessionsCollection::new()
            .with_session_timeout(session.local_logical_session_timeout()),
    );
    let transactions = Arc::new(InMemoryTransactionTable::new());

    let cache = SessionCache::new(
        config,
        liaison,
        collection.clone(),
        transaction_reaper(transactions.clone()),
    );
    let config = cache.config();
    info!(
        refresh_interval_ms = config.refresh_interval.as_millis() as u64,
        refresh_disabled = config.refresh_disabled,
        max_sessions = config.max_sessions,
        "Started logical session cache"
    );

    let now = Utc::now();
    for _ in 0..args.sessions {
        let id = SessionId::new();
        if let Err(e) = cache.vivify(&id) {
            warn!(error = %e, "Stopped vivifying startup sessions");
            break;
        }
        transactions.record_write(id, now);
    }
    if args.sessions > 0 {
        info!(count = cache.size(), "Vivified startup sessions");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down logical session cache");
    cache.join_on_shutdown().await;

    let stats = cache.stats();
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats("Logical Session Cache", &stats);
        if ctx.verbose {
            println!("  durable session records: {}", collection.len());
            println!("  transaction records:     {}", transactions.len());
            println!();
        }
    }

    Ok(())
}
