//! Operation context handed to collaborators during background jobs.

use std::sync::Arc;

use parking_lot::Mutex;

/// Per-operation state shared between the cache and its collaborators.
///
/// Cloning is cheap; clones refer to the same operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    inner: Arc<OperationInner>,
}

#[derive(Debug)]
struct OperationInner {
    client: String,
    sharding_failure: Mutex<Option<String>>,
}

impl OperationContext {
    /// Create a context on behalf of the named client.
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(OperationInner {
                client: client.into(),
                sharding_failure: Mutex::new(None),
            }),
        }
    }

    /// Name of the client this operation runs for.
    pub fn client(&self) -> &str {
        &self.inner.client
    }

    /// Record a sharding-related failure (e.g. stale routing information)
    /// observed while running against the sessions collection.
    pub fn set_sharding_failure(&self, reason: impl Into<String>) {
        *self.inner.sharding_failure.lock() = Some(reason.into());
    }

    /// The recorded sharding failure, if any.
    pub fn sharding_failure(&self) -> Option<String> {
        self.inner.sharding_failure.lock().clone()
    }

    /// Clear any recorded sharding failure.
    pub fn clear_sharding_failure(&self) {
        self.inner.sharding_failure.lock().take();
    }
}
