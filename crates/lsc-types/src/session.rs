//! Logical session identity and cached record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Owner Digest
// ─────────────────────────────────────────────────────────────────────────────

/// SHA-256 digest identifying the principal that owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerDigest([u8; 32]);

impl OwnerDigest {
    /// Wrap a precomputed digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest of a principal name.
    pub fn of(principal: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(principal.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for OwnerDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Id
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a logical session.
///
/// Two ids are equal only when both the UUID and the owner digest match, so
/// the same UUID presented by two principals names two different sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    id: Uuid,
    uid: Option<OwnerDigest>,
}

impl SessionId {
    /// Create a new random session id without an owner.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            uid: None,
        }
    }

    /// Create a new random session id owned by `owner`.
    pub fn owned_by(owner: OwnerDigest) -> Self {
        Self {
            id: Uuid::new_v4(),
            uid: Some(owner),
        }
    }

    /// Create from existing parts.
    pub fn from_parts(id: Uuid, uid: Option<OwnerDigest>) -> Self {
        Self { id, uid }
    }

    /// The session UUID.
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// The owner digest, if the session is bound to a principal.
    pub fn owner(&self) -> Option<&OwnerDigest> {
        self.uid.as_ref()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.uid {
            Some(uid) => write!(f, "{} - {}", self.id, uid),
            None => write!(f, "{}", self.id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Record
// ─────────────────────────────────────────────────────────────────────────────

/// Cached state of one logical session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identity.
    pub id: SessionId,

    /// Last time the session was known to be in use.
    pub last_use: DateTime<Utc>,

    /// Name of the user that owns the session. Display only, not identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl SessionRecord {
    /// Create a record last used at `last_use`.
    pub fn new(id: SessionId, last_use: DateTime<Utc>) -> Self {
        Self {
            id,
            last_use,
            user: None,
        }
    }

    /// Set the owning user name.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Advance `last_use` to `now` if it is later. Returns whether it moved.
    pub fn touch(&mut self, now: DateTime<Utc>) -> bool {
        if now > self.last_use {
            self.last_use = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_id_equality_includes_owner() {
        let uuid = Uuid::new_v4();
        let alice = OwnerDigest::of("alice");
        let bob = OwnerDigest::of("bob");

        assert_eq!(
            SessionId::from_parts(uuid, Some(alice)),
            SessionId::from_parts(uuid, Some(alice))
        );
        assert_ne!(
            SessionId::from_parts(uuid, Some(alice)),
            SessionId::from_parts(uuid, Some(bob))
        );
        assert_ne!(
            SessionId::from_parts(uuid, Some(alice)),
            SessionId::from_parts(uuid, None)
        );
    }

    #[test]
    fn test_owner_digest_is_stable() {
        assert_eq!(OwnerDigest::of("alice"), OwnerDigest::of("alice"));
        assert_eq!(OwnerDigest::of("alice").to_string().len(), 64);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let start = Utc::now();
        let mut record = SessionRecord::new(SessionId::new(), start);

        assert!(!record.touch(start - Duration::seconds(5)));
        assert_eq!(record.last_use, start);

        assert!(record.touch(start + Duration::seconds(5)));
        assert_eq!(record.last_use, start + Duration::seconds(5));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = SessionRecord::new(SessionId::new(), Utc::now()).with_user("alice");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("lastUse").is_some());
        assert_eq!(json["user"], "alice");
    }
}
