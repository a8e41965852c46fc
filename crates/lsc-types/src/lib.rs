//! Shared types for the logical session cache.
//!
//! Session identity, cached records, cursor kill patterns, and the
//! configuration capability traits consumed by the cache.

pub mod config;
pub mod kill;
pub mod session;

pub use config::{
    ConfigProvider, HasLogicalSessionConfig, LogicalSessionConfigProvider,
    defaults as config_defaults,
};
pub use kill::{KillPattern, KillPatternSet};
pub use session::{OwnerDigest, SessionId, SessionRecord};
