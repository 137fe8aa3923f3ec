//! Identity map of tracked objects.

use super::state::{ObjectState, TrackedEntry};
use crate::entity::{describe, Identity, SharedEntity};
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityKey, EntityType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Maps each tracked identity to its object and lifecycle state.
///
/// Entries live in an arena keyed by registration slot, so every bulk
/// query returns registration order. Keyed objects are found by
/// `(type, key)`; unkeyed objects by handle identity.
#[derive(Debug, Default)]
pub struct ObjectTracker {
    entries: BTreeMap<u64, TrackedEntry>,
    index: HashMap<Identity, u64>,
    next_slot: u64,
}

impl ObjectTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of the entry tracking `obj`, if any.
    pub fn slot_of(&self, obj: &SharedEntity) -> Option<u64> {
        let (entity_type, key) = {
            let guard = obj.read();
            (guard.entity_type(), guard.key())
        };
        if let Some(key) = key {
            if let Some(slot) = self.index.get(&Identity::persisted(entity_type, key)) {
                return Some(*slot);
            }
        }
        self.entries
            .values()
            .find(|e| Arc::ptr_eq(&e.object, obj))
            .map(|e| e.slot)
    }

    /// Starts tracking `obj` in `state`. Returns the new slot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateRegistration`] if the identity is
    /// already tracked.
    pub fn track(&mut self, obj: &SharedEntity, state: ObjectState) -> CoreResult<u64> {
        if let Some(existing) = self.slot_of(obj).and_then(|slot| self.entries.get(&slot)) {
            return Err(CoreError::duplicate_registration(
                describe(&*obj.read()),
                existing.state,
            ));
        }

        let slot = self.next_slot;
        self.next_slot += 1;

        let identity = {
            let guard = obj.read();
            match guard.key() {
                Some(key) => Identity::persisted(guard.entity_type(), key),
                None => Identity::Transient(slot),
            }
        };

        self.index.insert(identity, slot);
        self.entries.insert(
            slot,
            TrackedEntry {
                slot,
                identity,
                object: Arc::clone(obj),
                state,
            },
        );
        Ok(slot)
    }

    /// Moves the entry tracking `obj` to `state`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotTracked`] if `obj` is not tracked.
    pub fn change_state(&mut self, obj: &SharedEntity, state: ObjectState) -> CoreResult<()> {
        let slot = self.require_slot(obj)?;
        self.set_state(slot, state);
        Ok(())
    }

    /// Moves the entry at `slot` to `state`. Returns `false` if the slot is
    /// empty.
    pub fn set_state(&mut self, slot: u64, state: ObjectState) -> bool {
        match self.entries.get_mut(&slot) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Stops tracking `obj` and returns its entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotTracked`] if `obj` is not tracked.
    pub fn untrack(&mut self, obj: &SharedEntity) -> CoreResult<TrackedEntry> {
        let slot = self.require_slot(obj)?;
        self.remove_slot(slot)
            .ok_or_else(|| CoreError::object_not_tracked(describe(&*obj.read())))
    }

    /// Removes the entry at `slot`.
    pub fn remove_slot(&mut self, slot: u64) -> Option<TrackedEntry> {
        let entry = self.entries.remove(&slot)?;
        self.index.remove(&entry.identity);
        Some(entry)
    }

    /// The entry tracking `obj`.
    pub fn fetch(&self, obj: &SharedEntity) -> Option<&TrackedEntry> {
        self.slot_of(obj).and_then(|slot| self.entries.get(&slot))
    }

    /// The entry tracking the persisted identity `(entity_type, key)`.
    #[must_use]
    pub fn fetch_by_identity(&self, entity_type: EntityType, key: EntityKey) -> Option<&TrackedEntry> {
        self.index
            .get(&Identity::persisted(entity_type, key))
            .and_then(|slot| self.entries.get(slot))
    }

    /// The entry at `slot`.
    #[must_use]
    pub fn fetch_slot(&self, slot: u64) -> Option<&TrackedEntry> {
        self.entries.get(&slot)
    }

    /// Entries in `state`, in registration order.
    #[must_use]
    pub fn fetch_by_state(&self, state: ObjectState) -> Vec<&TrackedEntry> {
        self.entries.values().filter(|e| e.state == state).collect()
    }

    /// Entries of `entity_type`, in registration order.
    #[must_use]
    pub fn fetch_by_type(&self, entity_type: EntityType) -> Vec<&TrackedEntry> {
        self.entries
            .values()
            .filter(|e| e.object.read().entity_type() == entity_type)
            .collect()
    }

    /// All entries, in registration order.
    #[must_use]
    pub fn fetch_all(&self) -> Vec<&TrackedEntry> {
        self.entries.values().collect()
    }

    /// Entries in `state`, ordered so that referenced objects come first.
    ///
    /// If A links to parent B, or B links to child A, and both are in the
    /// bucket, B precedes A. Parent links of A's children count as A's own,
    /// because inserting A cascades into them. Unrelated entries keep
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReferenceCycle`] if the bucket contains a
    /// reference cycle.
    pub fn fetch_in_dependency_order(&self, state: ObjectState) -> CoreResult<Vec<&TrackedEntry>> {
        let bucket = self.fetch_by_state(state);

        let mut edges: BTreeSet<(u64, u64)> = BTreeSet::new();
        for entry in &bucket {
            let (required, followers) = dependencies(&entry.object);
            for target in &required {
                if let Some(slot) = find_in(&bucket, target) {
                    if slot != entry.slot {
                        edges.insert((slot, entry.slot));
                    }
                }
            }
            for follower in &followers {
                if let Some(slot) = find_in(&bucket, follower) {
                    if slot != entry.slot {
                        edges.insert((entry.slot, slot));
                    }
                }
            }
        }

        let mut in_degree: BTreeMap<u64, usize> = bucket.iter().map(|e| (e.slot, 0)).collect();
        for (_, to) in &edges {
            if let Some(degree) = in_degree.get_mut(to) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<u64> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(slot, _)| *slot)
            .collect();

        let mut ordered = Vec::with_capacity(bucket.len());
        while let Some(slot) = ready.pop_first() {
            if let Some(entry) = self.entries.get(&slot) {
                ordered.push(entry);
            }
            for (_, to) in edges.range((slot, 0)..=(slot, u64::MAX)) {
                if let Some(degree) = in_degree.get_mut(to) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*to);
                    }
                }
            }
        }

        if ordered.len() < bucket.len() {
            return Err(CoreError::ReferenceCycle {
                state,
                involved: bucket.len() - ordered.len(),
            });
        }
        Ok(ordered)
    }

    /// Re-indexes the entry at `slot` under `identity`. Returns the old
    /// identity, or `None` if the slot is empty.
    pub fn rekey(&mut self, slot: u64, identity: Identity) -> Option<Identity> {
        let entry = self.entries.get_mut(&slot)?;
        let old = std::mem::replace(&mut entry.identity, identity);
        self.index.remove(&old);
        self.index.insert(identity, slot);
        Some(old)
    }

    /// Number of entries in `state`.
    #[must_use]
    pub fn count_by_state(&self, state: ObjectState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn require_slot(&self, obj: &SharedEntity) -> CoreResult<u64> {
        self.slot_of(obj)
            .ok_or_else(|| CoreError::object_not_tracked(describe(&*obj.read())))
    }
}

/// Objects that must be persisted before `root`, and objects that must
/// follow it.
///
/// Walks `root`'s child links transitively. Parent links leaving that
/// subtree are requirements; the subtree below `root` follows it.
fn dependencies(root: &SharedEntity) -> (Vec<SharedEntity>, Vec<SharedEntity>) {
    let mut subtree: Vec<SharedEntity> = vec![Arc::clone(root)];
    let mut parents: Vec<SharedEntity> = Vec::new();
    let mut cursor = 0;

    while cursor < subtree.len() {
        let (parent_links, child_links) = {
            let guard = subtree[cursor].read();
            (guard.parent_links(), guard.child_links())
        };
        cursor += 1;
        parents.extend(parent_links.into_iter().map(|l| l.target));
        for link in child_links {
            if !subtree.iter().any(|s| Arc::ptr_eq(s, &link.target)) {
                subtree.push(link.target);
            }
        }
    }

    parents.retain(|p| !subtree.iter().any(|s| Arc::ptr_eq(s, p)));
    subtree.remove(0);
    (parents, subtree)
}

fn find_in(bucket: &[&TrackedEntry], obj: &SharedEntity) -> Option<u64> {
    if let Some(entry) = bucket.iter().find(|e| Arc::ptr_eq(&e.object, obj)) {
        return Some(entry.slot);
    }
    let identity = {
        let guard = obj.read();
        Identity::persisted(guard.entity_type(), guard.key()?)
    };
    bucket.iter().find(|e| e.identity == identity).map(|e| e.slot)
}
