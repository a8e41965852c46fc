//! Cursor kill patterns derived from session identity.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::session::{OwnerDigest, SessionId};

/// Describes which open cursors should be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum KillPattern {
    /// Every cursor attached to any session.
    All,
    /// Cursors attached to any session owned by this principal.
    Owner(OwnerDigest),
    /// Cursors attached to exactly this session.
    Session(SessionId),
}

impl KillPattern {
    /// Whether a cursor opened under `session` falls under this pattern.
    pub fn matches(&self, session: &SessionId) -> bool {
        match self {
            KillPattern::All => true,
            KillPattern::Owner(owner) => session.owner() == Some(owner),
            KillPattern::Session(id) => id == session,
        }
    }
}

impl From<SessionId> for KillPattern {
    fn from(id: SessionId) -> Self {
        KillPattern::Session(id)
    }
}

/// A set of kill patterns applied in a single batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillPatternSet {
    patterns: HashSet<KillPattern>,
}

impl KillPatternSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern. Returns false if it was already present.
    pub fn insert(&mut self, pattern: impl Into<KillPattern>) -> bool {
        self.patterns.insert(pattern.into())
    }

    /// Whether any pattern in the set matches `session`.
    pub fn matches(&self, session: &SessionId) -> bool {
        self.patterns.iter().any(|p| p.matches(session))
    }

    /// Check whether a specific pattern is in the set.
    pub fn contains(&self, pattern: &KillPattern) -> bool {
        self.patterns.contains(pattern)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KillPattern> {
        self.patterns.iter()
    }
}

impl<P: Into<KillPattern>> FromIterator<P> for KillPatternSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            patterns: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<P: Into<KillPattern>> Extend<P> for KillPatternSet {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        self.patterns.extend(iter.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_pattern_matches_exact_id() {
        let a = SessionId::new();
        let b = SessionId::new();
        let pattern = KillPattern::from(a);

        assert!(pattern.matches(&a));
        assert!(!pattern.matches(&b));
    }

    #[test]
    fn test_owner_pattern_matches_owned_sessions() {
        let alice = OwnerDigest::of("alice");
        let pattern = KillPattern::Owner(alice);

        assert!(pattern.matches(&SessionId::owned_by(alice)));
        assert!(!pattern.matches(&SessionId::owned_by(OwnerDigest::of("bob"))));
        assert!(!pattern.matches(&SessionId::new()));
    }

    #[test]
    fn test_set_matches_any() {
        let a = SessionId::new();
        let b = SessionId::new();
        let set: KillPatternSet = [a].into_iter().collect();

        assert!(set.matches(&a));
        assert!(!set.matches(&b));
        assert!(!KillPatternSet::new().matches(&a));

        let all: KillPatternSet = [KillPattern::All].into_iter().collect();
        assert!(all.matches(&b));
    }
}
