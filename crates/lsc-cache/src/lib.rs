//! Logical session cache.
//!
//! Each node keeps the sessions it has seen recently in a [`SessionCache`]
//! and periodically pushes them to a shared [`SessionsCollection`], so
//! sessions stay alive cluster-wide while in use and expire once idle.
//!
//! - Operations promote or vivify sessions synchronously, without I/O
//! - A refresh job writes active sessions, removes ended ones, and kills
//!   cursors whose session is gone
//! - A reap job removes transaction state of long-idle sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use lsc_cache::{CacheConfig, InMemorySessionsCollection, SessionCache, TokioServiceLiaison};
//!
//! let cache = SessionCache::new(
//!     CacheConfig::default().with_max_sessions(1000),
//!     Arc::new(TokioServiceLiaison::new()),
//!     Arc::new(InMemorySessionsCollection::new()),
//!     noop_reaper(),
//! );
//! cache.vivify(&SessionId::new())?;
//! ```

mod cache;
mod collection;
mod config;
mod error;
mod guard;
mod liaison;
mod operation;
mod reaper;
mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{REAP_JOB_NAME, REFRESH_JOB_NAME, SessionCache};
pub use collection::{InMemorySessionsCollection, SESSIONS_NAMESPACE, SessionsCollection};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use guard::{ScopeGuard, on_scope_exit};
pub use liaison::{
    ActivityRegistry, CursorId, CursorKillOutcome, JobTask, OperationGuard, PeriodicJob,
    ServiceLiaison, TokioServiceLiaison,
};
pub use operation::OperationContext;
pub use reaper::{
    InMemoryTransactionTable, ReapSessionsOlderThan, TransactionTable, noop_reaper, reap_fn,
    transaction_reaper,
};
pub use stats::CacheStats;
