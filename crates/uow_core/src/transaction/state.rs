//! Object and transaction states.

use crate::entity::{Identity, SharedEntity};
use std::fmt;

/// Lifecycle state of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Not yet persisted; inserted on commit.
    New,
    /// Persisted and possibly modified; updated on commit.
    Dirty,
    /// Persisted and read-only in this transaction; no storage call.
    Clean,
    /// Persisted and scheduled for removal; deleted on commit.
    Deleted,
}

impl ObjectState {
    /// Every state, in commit order.
    pub const ALL: [Self; 4] = [Self::New, Self::Dirty, Self::Deleted, Self::Clean];

    /// Returns `true` for states that hold a pessimistic lock.
    #[must_use]
    pub const fn holds_lock(self) -> bool {
        matches!(self, Self::Dirty | Self::Deleted)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Dirty => "dirty",
            Self::Clean => "clean",
            Self::Deleted => "deleted",
        })
    }
}

/// One tracked object and its current state.
#[derive(Debug, Clone)]
pub struct TrackedEntry {
    pub(crate) slot: u64,
    pub(crate) identity: Identity,
    pub(crate) object: SharedEntity,
    pub(crate) state: ObjectState,
}

impl TrackedEntry {
    /// Registration slot; lower slots were registered earlier.
    #[must_use]
    pub const fn slot(&self) -> u64 {
        self.slot
    }

    /// Current identity.
    #[must_use]
    pub const fn identity(&self) -> Identity {
        self.identity
    }

    /// The tracked handle.
    #[must_use]
    pub fn object(&self) -> &SharedEntity {
        &self.object
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ObjectState {
        self.state
    }
}

/// How the last completed commit or rollback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `commit()` succeeded.
    Committed,
    /// `rollback()` succeeded.
    RolledBack,
}

/// Observable state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations; changes are pending.
    Active,
    /// Committed; may be completed, or keep accepting operations.
    Committed,
    /// Rolled back; may be completed, or keep accepting operations.
    RolledBack,
    /// Completed or aborted. Terminal.
    Finalized,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Finalized => "finalized",
        })
    }
}

/// What a successful `commit()` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// NEW entries inserted directly.
    pub inserted: usize,
    /// NEW entries that received a key from a parent's cascade.
    pub cascaded: usize,
    /// DIRTY entries updated.
    pub updated: usize,
    /// DIRTY entries skipped because nothing changed.
    pub unchanged: usize,
    /// DELETED entries removed.
    pub deleted: usize,
    /// Persistence passes run.
    pub attempts: usize,
    /// Unresolved references registered as new during the commit.
    pub auto_registered: usize,
}

impl CommitSummary {
    /// Number of mutating mapper calls made by the successful pass.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_holding_states() {
        assert!(ObjectState::Dirty.holds_lock());
        assert!(ObjectState::Deleted.holds_lock());
        assert!(!ObjectState::New.holds_lock());
        assert!(!ObjectState::Clean.holds_lock());
    }

    #[test]
    fn summary_writes() {
        let summary = CommitSummary {
            inserted: 2,
            updated: 1,
            unchanged: 4,
            deleted: 1,
            ..CommitSummary::default()
        };
        assert_eq!(summary.writes(), 4);
    }
}
