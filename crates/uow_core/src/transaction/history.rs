//! Per-identity snapshot log.

use crate::entity::{EntityLink, Identity, SharedEntity, Snapshot};
use crate::schema::row;
use std::collections::HashMap;

/// One logged state: the captured snapshot and the parent links it was
/// taken with.
#[derive(Debug, Clone)]
struct Checkpoint {
    snapshot: Snapshot,
    parents: Vec<EntityLink>,
}

/// Append-only log of snapshots for each tracked identity, oldest first.
///
/// The last snapshot is the baseline for diff updates and the restore
/// point for rollback. Snapshots are taken with [`row::capture`], so they
/// carry the foreign-key columns of the entity's parent references.
#[derive(Debug, Default)]
pub struct ObjectHistory {
    logs: HashMap<Identity, Vec<Checkpoint>>,
}

impl ObjectHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the entity's current state under `identity`.
    pub fn append(&mut self, identity: Identity, entity: &SharedEntity) {
        let checkpoint = {
            let guard = entity.read();
            Checkpoint {
                snapshot: row::capture(&*guard),
                parents: guard.parent_links(),
            }
        };
        self.logs.entry(identity).or_default().push(checkpoint);
    }

    /// Most recent snapshot for `identity`.
    #[must_use]
    pub fn last(&self, identity: &Identity) -> Option<&Snapshot> {
        self.logs
            .get(identity)
            .and_then(|log| log.last())
            .map(|c| &c.snapshot)
    }

    /// Most recent snapshot for `identity` with the parent links it was
    /// taken with.
    #[must_use]
    pub fn restore_point(&self, identity: &Identity) -> Option<(&Snapshot, &[EntityLink])> {
        self.logs
            .get(identity)
            .and_then(|log| log.last())
            .map(|c| (&c.snapshot, c.parents.as_slice()))
    }

    /// Drops the whole log for `identity`. Returns the number of snapshots
    /// dropped.
    pub fn delete(&mut self, identity: &Identity) -> Option<usize> {
        self.logs.remove(identity).map(|log| log.len())
    }

    /// Moves the log of `old` to `new`, appending to any log already there.
    pub fn rekey(&mut self, old: &Identity, new: Identity) {
        if let Some(mut moved) = self.logs.remove(old) {
            let log = self.logs.entry(new).or_default();
            log.append(&mut moved);
        }
    }

    /// Number of snapshots logged for `identity`.
    #[must_use]
    pub fn len(&self, identity: &Identity) -> usize {
        self.logs.get(identity).map_or(0, Vec::len)
    }

    /// Number of identities with a log.
    #[must_use]
    pub fn identities(&self) -> usize {
        self.logs.len()
    }

    /// Returns `true` if no identity has a log.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Drops every log.
    pub fn clear(&mut self) {
        self.logs.clear();
    }
}
