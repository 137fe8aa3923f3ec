//! The unit of work.

use super::history::ObjectHistory;
use super::policy::{LockingMode, LockingPolicy};
use super::registry::TransactionRegistry;
use super::state::{CommitSummary, ObjectState, Outcome, TrackedEntry, TransactionState};
use super::tracker::ObjectTracker;
use crate::config::Config;
use crate::entity::{describe, same_links, Identity, SharedEntity, Snapshot};
use crate::error::{CoreError, CoreResult};
use crate::mapper::{Mapper, MapperError};
use crate::schema::{row, SchemaRegistry};
use crate::types::{EntityKey, EntityType, TransactionToken};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A unit of work over a graph of entities.
///
/// Objects are registered in one of four states. `commit` replays those
/// states to the mapper inside one atomic scope; `rollback` restores
/// modified objects from their last snapshot. The transaction stays usable
/// after either until `complete` or `abort` finalizes it.
///
/// Dropping a transaction that was not finalized aborts it.
pub struct Transaction {
    token: TransactionToken,
    valid: bool,
    outcome: Option<Outcome>,
    tracker: ObjectTracker,
    history: ObjectHistory,
    mapper: Arc<dyn Mapper>,
    schemas: Arc<SchemaRegistry>,
    registry: TransactionRegistry,
    policy: Box<dyn LockingPolicy>,
    config: Config,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("token", &self.token)
            .field("state", &self.state())
            .field("mode", &self.policy.mode())
            .field("tracked", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Why one persistence pass failed.
enum PassError {
    Unresolved {
        reference: SharedEntity,
        attribute: &'static str,
    },
    Fatal(CoreError),
}

impl From<CoreError> for PassError {
    fn from(e: CoreError) -> Self {
        Self::Fatal(e)
    }
}

/// Mapper calls that succeeded inside the atomic scope.
#[derive(Default)]
struct Staged {
    inserted: Vec<(u64, EntityKey)>,
    cascaded: Vec<(u64, EntityKey)>,
    updated: Vec<u64>,
    unchanged: usize,
    deleted: Vec<u64>,
}

impl Transaction {
    /// Creates a transaction and adds it to `registry`.
    pub fn new(
        mapper: Arc<dyn Mapper>,
        schemas: Arc<SchemaRegistry>,
        registry: TransactionRegistry,
        policy: Box<dyn LockingPolicy>,
        config: Config,
    ) -> Self {
        let token = TransactionToken::new();
        registry.add(token, policy.mode());
        debug!(token = %token, mode = %policy.mode(), "transaction started");
        Self {
            token,
            valid: true,
            outcome: None,
            tracker: ObjectTracker::new(),
            history: ObjectHistory::new(),
            mapper,
            schemas,
            registry,
            policy,
            config,
        }
    }

    /// The transaction's token.
    #[must_use]
    pub const fn token(&self) -> TransactionToken {
        self.token
    }

    /// The locking mode.
    #[must_use]
    pub fn mode(&self) -> LockingMode {
        self.policy.mode()
    }

    /// Returns `true` until the transaction is finalized.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns `true` after a commit or rollback with no registration since.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.outcome.is_some()
    }

    /// The observable transaction state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        match (self.valid, self.outcome) {
            (false, _) => TransactionState::Finalized,
            (true, None) => TransactionState::Active,
            (true, Some(Outcome::Committed)) => TransactionState::Committed,
            (true, Some(Outcome::RolledBack)) => TransactionState::RolledBack,
        }
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracker.len()
    }

    /// Number of tracked objects in `state`.
    #[must_use]
    pub fn count_by_state(&self, state: ObjectState) -> usize {
        self.tracker.count_by_state(state)
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(CoreError::invalid_transaction(self.token))
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers an unsaved object for insertion.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is finalized, the type is unknown, the
    /// object already has a key, or it is already tracked as new.
    pub fn register_new(&mut self, obj: &SharedEntity) -> CoreResult<()> {
        self.ensure_active()?;
        self.policy.check_direct_registration(ObjectState::New)?;
        self.register(obj, ObjectState::New)
    }

    /// Registers a persisted object as read-only.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is finalized, the type is unknown, the
    /// object has no key, or it is already tracked as clean.
    pub fn register_clean(&mut self, obj: &SharedEntity) -> CoreResult<()> {
        self.ensure_active()?;
        self.policy.check_direct_registration(ObjectState::Clean)?;
        self.register(obj, ObjectState::Clean)
    }

    /// Registers a persisted object for update.
    ///
    /// The object's current state becomes the baseline for the update diff.
    ///
    /// # Errors
    ///
    /// As [`register_clean`](Self::register_clean); additionally
    /// [`CoreError::IllegalOperation`] under pessimistic locking.
    pub fn register_dirty(&mut self, obj: &SharedEntity) -> CoreResult<()> {
        self.ensure_active()?;
        self.policy.check_direct_registration(ObjectState::Dirty)?;
        self.register(obj, ObjectState::Dirty)
    }

    /// Registers a persisted object for deletion.
    ///
    /// # Errors
    ///
    /// As [`register_dirty`](Self::register_dirty).
    pub fn register_deleted(&mut self, obj: &SharedEntity) -> CoreResult<()> {
        self.ensure_active()?;
        self.policy.check_direct_registration(ObjectState::Deleted)?;
        self.register(obj, ObjectState::Deleted)
    }

    /// Locks, loads and registers a persisted object for update.
    ///
    /// Reuses the tracked object if this transaction already tracks the
    /// identity. Under the unlocked policy no lock is taken.
    ///
    /// # Errors
    ///
    /// [`CoreError::LockConflict`] if another transaction holds the lock;
    /// nothing is registered in that case. Fetch and registration errors
    /// release a lock taken by this call.
    pub fn load_as_dirty(&mut self, entity_type: EntityType, key: EntityKey) -> CoreResult<SharedEntity> {
        self.load_as(entity_type, key, ObjectState::Dirty)
    }

    /// Locks, loads and registers a persisted object for deletion.
    ///
    /// # Errors
    ///
    /// As [`load_as_dirty`](Self::load_as_dirty).
    pub fn load_as_deleted(
        &mut self,
        entity_type: EntityType,
        key: EntityKey,
    ) -> CoreResult<SharedEntity> {
        self.load_as(entity_type, key, ObjectState::Deleted)
    }

    /// Stops tracking an object and drops its history.
    ///
    /// A lock held for a DIRTY or DELETED object is released first.
    ///
    /// # Errors
    ///
    /// [`CoreError::ObjectNotTracked`] if the object is not tracked.
    pub fn unregister(&mut self, obj: &SharedEntity) -> CoreResult<()> {
        self.ensure_active()?;
        let entry = self
            .tracker
            .fetch(obj)
            .cloned()
            .ok_or_else(|| CoreError::object_not_tracked(describe(&*obj.read())))?;

        self.release_entry_lock(&entry)?;
        entry.object.write().version_mut().release(self.token);
        self.tracker.remove_slot(entry.slot);
        self.history.delete(&entry.identity);
        debug!(token = %self.token, identity = %entry.identity, "unregistered");
        Ok(())
    }

    fn load_as(
        &mut self,
        entity_type: EntityType,
        key: EntityKey,
        target: ObjectState,
    ) -> CoreResult<SharedEntity> {
        self.ensure_active()?;
        let schema = self
            .schemas
            .get(entity_type)
            .ok_or_else(|| CoreError::type_mismatch(entity_type.name()))?;

        let tracked = self
            .tracker
            .fetch_by_identity(entity_type, key)
            .map(|e| (Arc::clone(&e.object), e.state));
        let already_locked = tracked.as_ref().is_some_and(|(_, state)| state.holds_lock());

        self.policy
            .acquire(self.mapper.as_ref(), entity_type, key, self.token)?;

        let loaded = match tracked {
            Some((obj, _)) => Ok(obj),
            None => self.mapper.fetch(schema, key).map_err(CoreError::from),
        };
        let outcome = match loaded {
            Ok(obj) => self.register(&obj, target).map(|()| obj),
            Err(e) => Err(e),
        };

        if outcome.is_err() && !already_locked {
            if let Err(e) = self
                .policy
                .release(self.mapper.as_ref(), entity_type, key, self.token)
            {
                warn!(token = %self.token, %entity_type, %key, error = %e, "lock release failed");
            }
        }
        outcome
    }

    /// Shared registration path. All checks run before any mutation.
    fn register(&mut self, obj: &SharedEntity, target: ObjectState) -> CoreResult<()> {
        let (entity_type, key, label) = {
            let guard = obj.read();
            (guard.entity_type(), guard.key(), describe(&*guard))
        };

        if !self.schemas.contains(entity_type) {
            return Err(CoreError::type_mismatch(entity_type.name()));
        }
        match (target, key) {
            (ObjectState::New, Some(key)) => {
                return Err(CoreError::missing_identity(format!(
                    "{label} already has key {key}; only unsaved objects can be registered as new"
                )));
            }
            (ObjectState::Dirty | ObjectState::Clean | ObjectState::Deleted, None) => {
                return Err(CoreError::missing_identity(format!(
                    "{label} has no key; only persisted objects can be registered as {target}"
                )));
            }
            _ => {}
        }

        let existing = self
            .tracker
            .fetch(obj)
            .map(|e| (e.slot, e.state));
        if let Some((_, state)) = existing {
            if state == target {
                return Err(CoreError::duplicate_registration(label, state));
            }
        }
        if target == ObjectState::New {
            self.policy.stamp_new(obj, self.token)?;
        }
        if let Some((slot, state)) = existing {
            // Leaving DIRTY/DELETED gives up the storage lock.
            if state.holds_lock() && !target.holds_lock() {
                if let Some(entry) = self.tracker.fetch_slot(slot).cloned() {
                    self.release_entry_lock(&entry)?;
                }
            }
        }

        let slot = match existing {
            Some((slot, _)) => {
                self.tracker.set_state(slot, target);
                slot
            }
            None => self.tracker.track(obj, target)?,
        };
        if let Some(entry) = self.tracker.fetch_slot(slot) {
            self.history.append(entry.identity, obj);
        }
        self.outcome = None;
        debug!(token = %self.token, entity = %label, state = %target, "registered");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The tracked handle for `obj`'s identity.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn fetch_object(&self, obj: &SharedEntity) -> CoreResult<Option<SharedEntity>> {
        self.ensure_active()?;
        Ok(self.tracker.fetch(obj).map(|e| Arc::clone(&e.object)))
    }

    /// The tracked object with identity `(entity_type, key)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn fetch_object_by_id(
        &self,
        entity_type: EntityType,
        key: EntityKey,
    ) -> CoreResult<Option<SharedEntity>> {
        self.ensure_active()?;
        Ok(self
            .tracker
            .fetch_by_identity(entity_type, key)
            .map(|e| Arc::clone(&e.object)))
    }

    /// Tracked objects of `entity_type`, in registration order.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn fetch_objects_by_type(&self, entity_type: EntityType) -> CoreResult<Vec<SharedEntity>> {
        self.ensure_active()?;
        Ok(handles(self.tracker.fetch_by_type(entity_type)))
    }

    /// All tracked objects, in registration order.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn fetch_all_objects(&self) -> CoreResult<Vec<SharedEntity>> {
        self.ensure_active()?;
        Ok(handles(self.tracker.fetch_all()))
    }

    /// Tracked objects in `state`, in registration order.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn fetch_objects_by_state(&self, state: ObjectState) -> CoreResult<Vec<SharedEntity>> {
        self.ensure_active()?;
        Ok(handles(self.tracker.fetch_by_state(state)))
    }

    /// The state `obj` is tracked in.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn state_of(&self, obj: &SharedEntity) -> CoreResult<Option<ObjectState>> {
        self.ensure_active()?;
        Ok(self.tracker.fetch(obj).map(TrackedEntry::state))
    }

    /// The last snapshot logged for `obj`: its update baseline and
    /// rollback point.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] once finalized.
    pub fn baseline(&self, obj: &SharedEntity) -> CoreResult<Option<Snapshot>> {
        self.ensure_active()?;
        Ok(self
            .tracker
            .fetch(obj)
            .and_then(|e| self.history.last(&e.identity))
            .cloned())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Persists every pending change in one atomic mapper scope.
    ///
    /// NEW objects are inserted in dependency order, then DIRTY objects
    /// with changes are updated, then DELETED objects are removed. On
    /// success inserted objects become DIRTY under their new key and
    /// deleted objects are untracked.
    ///
    /// A reference to an unsaved, untracked object is registered as new and
    /// the pass is run again, up to [`Config::max_commit_attempts`] passes.
    ///
    /// # Errors
    ///
    /// Any mapper failure other than an unresolved reference is returned
    /// unchanged. The store is left as it was before the failed pass and
    /// the transaction stays active.
    pub fn commit(&mut self) -> CoreResult<CommitSummary> {
        self.ensure_active()?;
        let limit = self.config.commit_attempts();
        let mut auto_registered: Vec<SharedEntity> = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.commit_pass() {
                Ok(mut summary) => {
                    summary.attempts = attempt;
                    summary.auto_registered = auto_registered.len();
                    self.outcome = Some(Outcome::Committed);
                    debug!(
                        token = %self.token,
                        inserted = summary.inserted,
                        cascaded = summary.cascaded,
                        updated = summary.updated,
                        deleted = summary.deleted,
                        attempts = attempt,
                        "committed"
                    );
                    return Ok(summary);
                }
                Err(PassError::Fatal(e)) => {
                    debug!(token = %self.token, error = %e, "commit failed");
                    return Err(e);
                }
                Err(PassError::Unresolved {
                    reference,
                    attribute,
                }) => {
                    let label = describe(&*reference.read());
                    let seen = auto_registered.iter().any(|r| Arc::ptr_eq(r, &reference));
                    if seen || self.tracker.fetch(&reference).is_some() {
                        return Err(CoreError::unresolvable_reference(label));
                    }
                    if attempt >= limit {
                        return Err(CoreError::CommitAttemptsExhausted { attempts: attempt });
                    }
                    warn!(
                        token = %self.token,
                        entity = %label,
                        attribute,
                        attempt,
                        "unresolved reference, registering as new and retrying"
                    );
                    self.register(&reference, ObjectState::New)?;
                    auto_registered.push(reference);
                }
            }
        }
    }

    fn commit_pass(&mut self) -> Result<CommitSummary, PassError> {
        let new_entries: Vec<TrackedEntry> = self
            .tracker
            .fetch_in_dependency_order(ObjectState::New)?
            .into_iter()
            .cloned()
            .collect();

        let mut dirty_entries = Vec::new();
        for entry in self.tracker.fetch_by_state(ObjectState::Dirty) {
            let (baseline, parents) = self
                .history
                .restore_point(&entry.identity)
                .map(|(snapshot, parents)| (snapshot.clone(), parents.to_vec()))
                .ok_or_else(|| CoreError::history_missing(entry.identity.to_string()))?;
            dirty_entries.push((entry.clone(), baseline, parents));
        }

        // Children go before the parents they reference.
        let mut deleted_entries: Vec<TrackedEntry> = self
            .tracker
            .fetch_in_dependency_order(ObjectState::Deleted)?
            .into_iter()
            .cloned()
            .collect();
        deleted_entries.reverse();

        let prior_keys: Vec<Option<EntityKey>> =
            new_entries.iter().map(|e| e.object.read().key()).collect();

        let mapper = Arc::clone(&self.mapper);
        let token = self.token;
        let mut staged = Staged::default();
        let result = mapper.atomic(&mut || -> Result<(), MapperError> {
            staged = Staged::default();
            for (entry, prior) in new_entries.iter().zip(&prior_keys) {
                let current = entry.object.read().key();
                match (prior, current) {
                    (None, Some(key)) => staged.cascaded.push((entry.slot, key)),
                    _ => {
                        trace!(token = %token, identity = %entry.identity, "insert");
                        let key = mapper.insert(&entry.object, None)?;
                        staged.inserted.push((entry.slot, key));
                    }
                }
            }
            for (entry, baseline, parents) in &dirty_entries {
                let (current, links) = {
                    let guard = entry.object.read();
                    (row::capture(&*guard), guard.parent_links())
                };
                if current == *baseline && same_links(&links, parents) {
                    staged.unchanged += 1;
                    continue;
                }
                trace!(token = %token, identity = %entry.identity, "update");
                mapper.update(&entry.object, baseline)?;
                staged.updated.push(entry.slot);
            }
            for entry in &deleted_entries {
                trace!(token = %token, identity = %entry.identity, "delete");
                mapper.delete(&entry.object)?;
                staged.deleted.push(entry.slot);
            }
            Ok(())
        });

        if let Err(error) = result {
            for (entry, prior) in new_entries.iter().zip(&prior_keys) {
                entry.object.write().set_key(*prior);
            }
            return Err(match error {
                MapperError::UnresolvedReference {
                    reference,
                    attribute,
                } => PassError::Unresolved {
                    reference,
                    attribute,
                },
                other => PassError::Fatal(other.into()),
            });
        }

        Ok(self.apply(staged))
    }

    /// Records the effects of a successful pass in tracker and history.
    fn apply(&mut self, staged: Staged) -> CommitSummary {
        for &(slot, key) in staged.inserted.iter().chain(&staged.cascaded) {
            let Some(entry) = self.tracker.fetch_slot(slot).cloned() else {
                continue;
            };
            let entity_type = entry.object.read().entity_type();
            let identity = Identity::persisted(entity_type, key);
            if let Some(old) = self.tracker.rekey(slot, identity) {
                self.history.rekey(&old, identity);
            }
            self.tracker.set_state(slot, ObjectState::Dirty);
            self.history.append(identity, &entry.object);
        }

        for &slot in &staged.updated {
            if let Some(entry) = self.tracker.fetch_slot(slot) {
                self.history.append(entry.identity, &entry.object);
            }
        }

        for &slot in &staged.deleted {
            if let Some(entry) = self.tracker.remove_slot(slot) {
                if let Err(e) = self.release_entry_lock(&entry) {
                    warn!(token = %self.token, identity = %entry.identity, error = %e, "lock release failed");
                }
                entry.object.write().version_mut().release(self.token);
                self.history.delete(&entry.identity);
            }
        }

        CommitSummary {
            inserted: staged.inserted.len(),
            cascaded: staged.cascaded.len(),
            updated: staged.updated.len(),
            unchanged: staged.unchanged,
            deleted: staged.deleted.len(),
            attempts: 0,
            auto_registered: 0,
        }
    }

    // ========================================================================
    // Rollback and finalization
    // ========================================================================

    /// Restores every DIRTY and DELETED object from its last snapshot,
    /// including the parent links logged with it.
    ///
    /// DELETED objects move back to DIRTY. NEW objects stay tracked unless
    /// [`Config::discard_new_on_rollback`] is set.
    ///
    /// # Errors
    ///
    /// [`CoreError::HistoryMissing`] if any snapshot is missing; no object
    /// is restored in that case.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_active()?;

        let mut restores = Vec::new();
        for entry in self.tracker.fetch_all() {
            if matches!(entry.state, ObjectState::Clean | ObjectState::New) {
                continue;
            }
            let (snapshot, parents) = self
                .history
                .restore_point(&entry.identity)
                .map(|(snapshot, parents)| (snapshot.clone(), parents.to_vec()))
                .ok_or_else(|| CoreError::history_missing(entry.identity.to_string()))?;
            restores.push((entry.slot, entry.state, Arc::clone(&entry.object), snapshot, parents));
        }

        for (slot, state, object, snapshot, parents) in restores {
            {
                let mut guard = object.write();
                guard.restore(&snapshot)?;
                guard.relink(&parents);
            }
            if state == ObjectState::Deleted {
                self.tracker.set_state(slot, ObjectState::Dirty);
            }
        }

        if self.config.discard_new_on_rollback {
            let discarded: Vec<TrackedEntry> = self
                .tracker
                .fetch_by_state(ObjectState::New)
                .into_iter()
                .cloned()
                .collect();
            for entry in discarded {
                self.tracker.remove_slot(entry.slot);
                self.history.delete(&entry.identity);
                entry.object.write().version_mut().release(self.token);
            }
        }

        self.outcome = Some(Outcome::RolledBack);
        debug!(token = %self.token, "rolled back");
        Ok(())
    }

    /// Finalizes a committed or rolled back transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotCommitted`] if there is no commit or rollback since
    /// the last registration. Lock release failures are reported after the
    /// transaction is finalized.
    pub fn complete(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.outcome.is_none() {
            return Err(CoreError::NotCommitted { token: self.token });
        }
        self.finalize()
    }

    /// Alias for [`complete`](Self::complete).
    ///
    /// # Errors
    ///
    /// As [`complete`](Self::complete).
    pub fn finalize_commit(&mut self) -> CoreResult<()> {
        self.complete()
    }

    /// Finalizes the transaction without persisting pending changes.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] if already finalized. Lock release
    /// failures are reported after the transaction is finalized.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        debug!(token = %self.token, "aborting");
        self.finalize()
    }

    fn finalize(&mut self) -> CoreResult<()> {
        let mut first_error = None;
        for entry in self.tracker.fetch_all() {
            if let Err(e) = self.release_entry_lock(entry) {
                warn!(token = %self.token, identity = %entry.identity, error = %e, "lock release failed");
                first_error.get_or_insert(e);
            }
            entry.object.write().version_mut().release(self.token);
        }

        self.tracker.clear();
        self.history.clear();
        self.registry.remove(self.token);
        self.valid = false;
        debug!(token = %self.token, "finalized");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release_entry_lock(&self, entry: &TrackedEntry) -> CoreResult<()> {
        if !entry.state.holds_lock() {
            return Ok(());
        }
        match entry.identity {
            Identity::Persisted { entity_type, key } => {
                self.policy
                    .release(self.mapper.as_ref(), entity_type, key, self.token)
            }
            Identity::Transient(_) => Ok(()),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.valid {
            warn!(token = %self.token, "transaction dropped while active, aborting");
            if let Err(e) = self.finalize() {
                warn!(token = %self.token, error = %e, "abort on drop failed");
            }
        }
    }
}

fn handles(entries: Vec<&TrackedEntry>) -> Vec<SharedEntity> {
    entries.into_iter().map(|e| Arc::clone(&e.object)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::with_mut;
    use crate::testing::{keyed_widget, schemas, widget, NullMapper, Widget, WIDGET};
    use crate::transaction::{Pessimistic, Unlocked};

    fn begin(mapper: &Arc<NullMapper>, policy: Box<dyn LockingPolicy>) -> (Transaction, TransactionRegistry) {
        let registry = TransactionRegistry::new();
        let txn = Transaction::new(
            Arc::clone(mapper) as Arc<dyn Mapper>,
            Arc::new(schemas()),
            registry.clone(),
            policy,
            Config::default(),
        );
        (txn, registry)
    }

    fn unlocked() -> (Transaction, TransactionRegistry) {
        begin(&Arc::new(NullMapper::default()), Box::new(Unlocked))
    }

    #[test]
    fn new_transaction_is_registered_and_active() {
        let (txn, registry) = unlocked();
        assert!(registry.contains(txn.token()));
        assert_eq!(txn.state(), TransactionState::Active);
        assert!(!txn.is_committed());
    }

    #[test]
    fn key_requirements() {
        let (mut txn, _) = unlocked();
        assert!(matches!(
            txn.register_new(&keyed_widget(1, "a")),
            Err(CoreError::MissingIdentity { .. })
        ));
        for result in [
            txn.register_dirty(&widget("a")),
            txn.register_clean(&widget("a")),
            txn.register_deleted(&widget("a")),
        ] {
            assert!(matches!(result, Err(CoreError::MissingIdentity { .. })));
        }
        assert_eq!(txn.tracked_count(), 0);
    }

    #[test]
    fn same_state_twice_is_duplicate() {
        let (mut txn, _) = unlocked();
        let w = keyed_widget(1, "a");
        txn.register_dirty(&w).unwrap();
        assert!(matches!(
            txn.register_dirty(&w),
            Err(CoreError::DuplicateRegistration { state: ObjectState::Dirty, .. })
        ));
        assert_eq!(txn.baseline(&w).unwrap().map(|_| ()), Some(()));
    }

    #[test]
    fn different_state_is_a_transition() {
        let (mut txn, _) = unlocked();
        let w = keyed_widget(1, "a");
        txn.register_clean(&w).unwrap();
        txn.register_deleted(&w).unwrap();

        assert_eq!(txn.state_of(&w).unwrap(), Some(ObjectState::Deleted));
        assert_eq!(txn.tracked_count(), 1);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = TransactionRegistry::new();
        let mut txn = Transaction::new(
            Arc::new(NullMapper::default()),
            Arc::new(SchemaRegistry::new()),
            registry,
            Box::new(Unlocked),
            Config::default(),
        );
        assert!(matches!(
            txn.register_new(&widget("a")),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn commit_moves_new_to_dirty_under_key() {
        let (mut txn, _) = unlocked();
        let w = widget("a");
        txn.register_new(&w).unwrap();

        let summary = txn.commit().unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.attempts, 1);

        let key = w.read().key().unwrap();
        assert_eq!(txn.state_of(&w).unwrap(), Some(ObjectState::Dirty));
        assert!(txn.fetch_object_by_id(WIDGET, key).unwrap().is_some());
        assert_eq!(txn.state(), TransactionState::Committed);

        let again = txn.commit().unwrap();
        assert_eq!(again.writes(), 0);
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn rollback_restores_dirty_and_undeletes() {
        let (mut txn, _) = unlocked();
        let dirty = keyed_widget(1, "before");
        let deleted = keyed_widget(2, "gone");
        txn.register_dirty(&dirty).unwrap();
        txn.register_deleted(&deleted).unwrap();
        with_mut::<Widget, _>(&dirty, |w| w.name = "after".into()).unwrap();

        txn.rollback().unwrap();

        assert_eq!(with_mut::<Widget, _>(&dirty, |w| w.name.clone()).unwrap(), "before");
        assert_eq!(txn.state_of(&deleted).unwrap(), Some(ObjectState::Dirty));
        assert_eq!(txn.state(), TransactionState::RolledBack);
    }

    #[test]
    fn reference_edit_is_a_change() {
        let (mut txn, _) = unlocked();
        let first = keyed_widget(1, "first");
        let second = keyed_widget(2, "second");
        let w = keyed_widget(3, "gear");
        with_mut::<Widget, _>(&w, |w| w.owner = Some(first.clone())).unwrap();
        txn.register_dirty(&w).unwrap();

        with_mut::<Widget, _>(&w, |w| w.owner = Some(second.clone())).unwrap();
        txn.rollback().unwrap();
        let owner = with_mut::<Widget, _>(&w, |w| w.owner.clone()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&owner, &first));
        assert_eq!(txn.commit().unwrap().updated, 0);

        with_mut::<Widget, _>(&w, |w| w.owner = Some(second.clone())).unwrap();
        assert_eq!(txn.commit().unwrap().updated, 1);
    }

    #[test]
    fn complete_requires_commit_or_rollback() {
        let (mut txn, registry) = unlocked();
        txn.register_new(&widget("a")).unwrap();
        assert!(matches!(txn.complete(), Err(CoreError::NotCommitted { .. })));

        txn.commit().unwrap();
        txn.complete().unwrap();
        assert_eq!(txn.state(), TransactionState::Finalized);
        assert!(!registry.contains(txn.token()));
        assert!(matches!(
            txn.commit(),
            Err(CoreError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn abort_always_finalizes() {
        let (mut txn, registry) = unlocked();
        txn.register_new(&widget("a")).unwrap();
        txn.abort().unwrap();

        assert!(!txn.is_valid());
        assert_eq!(registry.active_count(), 0);
        assert!(txn.fetch_all_objects().is_err());
    }

    #[test]
    fn drop_aborts() {
        let (txn, registry) = unlocked();
        let token = txn.token();
        drop(txn);
        assert!(!registry.contains(token));
    }

    #[test]
    fn unregister_drops_entry_and_history() {
        let (mut txn, _) = unlocked();
        let w = keyed_widget(3, "a");
        txn.register_clean(&w).unwrap();
        txn.unregister(&w).unwrap();

        assert_eq!(txn.state_of(&w).unwrap(), None);
        assert_eq!(txn.baseline(&w).unwrap(), None);
        assert!(matches!(
            txn.unregister(&w),
            Err(CoreError::ObjectNotTracked { .. })
        ));
    }

    #[test]
    fn pessimistic_load_locks_and_finalize_releases() {
        let mapper = Arc::new(NullMapper::default());
        let (mut txn, _) = begin(&mapper, Box::new(Pessimistic));
        let key = EntityKey::new(5);

        assert!(matches!(
            txn.register_dirty(&keyed_widget(5, "a")),
            Err(CoreError::IllegalOperation { .. })
        ));

        let w = txn.load_as_dirty(WIDGET, key).unwrap();
        assert_eq!(mapper.lock_owner(WIDGET, key), Some(txn.token()));
        assert_eq!(w.read().key(), Some(key));

        let (mut other, _) = begin(&mapper, Box::new(Pessimistic));
        assert!(matches!(
            other.load_as_dirty(WIDGET, key),
            Err(CoreError::LockConflict { .. })
        ));
        assert_eq!(other.tracked_count(), 0);

        txn.abort().unwrap();
        assert_eq!(mapper.lock_owner(WIDGET, key), None);
        assert!(other.load_as_deleted(WIDGET, key).is_ok());
    }

    #[test]
    fn failed_load_releases_its_lock() {
        let mapper = Arc::new(NullMapper::default());
        let (mut txn, _) = begin(&mapper, Box::new(Pessimistic));
        let key = EntityKey::new(9);

        txn.load_as_dirty(WIDGET, key).unwrap();
        // Already dirty: duplicate, but the lock was held before the call.
        assert!(txn.load_as_dirty(WIDGET, key).is_err());
        assert_eq!(mapper.lock_owner(WIDGET, key), Some(txn.token()));

        assert!(matches!(
            txn.load_as_dirty(EntityType::new("Gadget"), key),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn pessimistic_new_stamps_version() {
        let mapper = Arc::new(NullMapper::default());
        let (mut txn, _) = begin(&mapper, Box::new(Pessimistic));
        let w = widget("a");
        txn.register_new(&w).unwrap();
        assert_eq!(w.read().version().owner(), Some(txn.token()));

        let (mut other, _) = begin(&mapper, Box::new(Pessimistic));
        assert!(matches!(
            other.register_new(&w),
            Err(CoreError::VersionLocked { .. })
        ));

        txn.abort().unwrap();
        assert!(!w.read().version().is_locked());
    }
}
