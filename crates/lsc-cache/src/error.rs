//! Error types for logical session cache operations.

use lsc_types::SessionId;

/// Error type for logical session cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The session is not in the active cache.
    #[error("no matching session record found in the cache: {0}")]
    NoSuchSession(SessionId),

    /// The active cache is full.
    #[error("cannot add session into the cache: {max} sessions already active")]
    TooManyLogicalSessions { max: usize },

    /// The sessions collection has not been provisioned yet.
    #[error("sessions collection does not exist: {0}")]
    NamespaceNotFound(String),

    /// A durable sessions collection operation failed.
    #[error("sessions collection error: {0}")]
    SessionsCollection(String),

    /// The service liaison failed to perform an operation.
    #[error("service liaison error: {0}")]
    Liaison(String),

    /// The reap strategy failed.
    #[error("transaction reaper error: {0}")]
    Reap(String),
}

impl Error {
    /// Whether this error only means the sessions collection is not ready yet.
    pub fn is_not_provisioned(&self) -> bool {
        matches!(self, Error::NamespaceNotFound(_))
    }
}

/// Result type for logical session cache operations.
pub type Result<T> = std::result::Result<T, Error>;
