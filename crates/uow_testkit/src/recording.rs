//! Call-recording mapper with failure injection.
//!
//! [`RecordingMapper`] forwards every call to an inner [`MemoryMapper`]
//! and logs it, so tests can assert which storage operations a commit
//! issued and with what baseline. Failures can be injected per operation
//! and entity type to exercise the atomic rollback path.

use parking_lot::Mutex;
use std::sync::Arc;
use uow_core::{
    EntityKey, EntitySchema, EntityType, Mapper, MapperError, MapperResult, ParentKey,
    SharedEntity, Snapshot, TransactionToken,
};
use uow_mapper::MemoryMapper;

/// One call received by a [`RecordingMapper`].
#[derive(Debug, Clone, PartialEq)]
pub enum MapperCall {
    /// An atomic scope was opened.
    Atomic,
    /// Insert of an unsaved entity.
    Insert {
        /// Entity type.
        entity_type: EntityType,
        /// Parent key handed down by a cascade.
        parent: Option<ParentKey>,
    },
    /// Update of a persisted entity.
    Update {
        /// Entity type.
        entity_type: EntityType,
        /// Key of the updated entity.
        key: Option<EntityKey>,
        /// Baseline the delta was computed against.
        baseline: Snapshot,
        /// State written.
        current: Snapshot,
    },
    /// Delete of a persisted entity.
    Delete {
        /// Entity type.
        entity_type: EntityType,
        /// Key of the deleted entity.
        key: Option<EntityKey>,
    },
    /// Load by identity.
    Fetch {
        /// Entity type.
        entity_type: EntityType,
        /// Requested key.
        key: EntityKey,
    },
    /// Lock acquisition.
    AcquireLock {
        /// Entity type.
        entity_type: EntityType,
        /// Locked key.
        key: EntityKey,
        /// Requesting transaction.
        owner: TransactionToken,
    },
    /// Lock release.
    ReleaseLock {
        /// Entity type.
        entity_type: EntityType,
        /// Released key.
        key: EntityKey,
        /// Releasing transaction.
        owner: TransactionToken,
    },
}

impl MapperCall {
    /// Returns `true` for insert, update and delete calls.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert { .. } | Self::Update { .. } | Self::Delete { .. })
    }

    /// The operation this call belongs to.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Atomic => Operation::Atomic,
            Self::Insert { .. } => Operation::Insert,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
            Self::Fetch { .. } => Operation::Fetch,
            Self::AcquireLock { .. } => Operation::AcquireLock,
            Self::ReleaseLock { .. } => Operation::ReleaseLock,
        }
    }
}

/// Mapper operation kinds, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`Mapper::atomic`].
    Atomic,
    /// [`Mapper::insert`].
    Insert,
    /// [`Mapper::update`].
    Update,
    /// [`Mapper::delete`].
    Delete,
    /// [`Mapper::fetch`].
    Fetch,
    /// [`Mapper::acquire_lock`].
    AcquireLock,
    /// [`Mapper::release_lock`].
    ReleaseLock,
}

#[derive(Debug, Clone)]
enum FailureKind {
    Storage,
    Unresolved {
        reference: SharedEntity,
        attribute: &'static str,
    },
}

#[derive(Debug, Clone)]
struct Failure {
    operation: Operation,
    entity_type: Option<EntityType>,
    kind: FailureKind,
}

/// A [`MemoryMapper`] that records every call.
#[derive(Debug)]
pub struct RecordingMapper {
    inner: Arc<MemoryMapper>,
    calls: Mutex<Vec<MapperCall>>,
    failures: Mutex<Vec<Failure>>,
}

impl RecordingMapper {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<MemoryMapper>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped mapper.
    #[must_use]
    pub fn inner(&self) -> &Arc<MemoryMapper> {
        &self.inner
    }

    /// Every recorded call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<MapperCall> {
        self.calls.lock().clone()
    }

    /// Recorded insert, update and delete calls.
    #[must_use]
    pub fn writes(&self) -> Vec<MapperCall> {
        self.calls.lock().iter().filter(|c| c.is_write()).cloned().collect()
    }

    /// Number of recorded calls of `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Makes every `operation` on `entity_type` fail until
    /// [`heal`](Self::heal) is called. `None` matches every type.
    pub fn fail_on(&self, operation: Operation, entity_type: Option<EntityType>) {
        self.failures.lock().push(Failure {
            operation,
            entity_type,
            kind: FailureKind::Storage,
        });
    }

    /// Makes every `operation` on `entity_type` report `reference` as an
    /// unresolved reference through `attribute` until
    /// [`heal`](Self::heal) is called.
    pub fn report_unresolved(
        &self,
        operation: Operation,
        entity_type: Option<EntityType>,
        reference: &SharedEntity,
        attribute: &'static str,
    ) {
        self.failures.lock().push(Failure {
            operation,
            entity_type,
            kind: FailureKind::Unresolved {
                reference: Arc::clone(reference),
                attribute,
            },
        });
    }

    /// Removes all injected failures.
    pub fn heal(&self) {
        self.failures.lock().clear();
    }

    fn record(&self, call: MapperCall) {
        self.calls.lock().push(call);
    }

    fn check(&self, operation: Operation, entity_type: Option<EntityType>) -> MapperResult<()> {
        let injected = self
            .failures
            .lock()
            .iter()
            .find(|f| {
                f.operation == operation
                    && (f.entity_type.is_none() || f.entity_type == entity_type)
            })
            .map(|f| f.kind.clone());
        match injected {
            Some(FailureKind::Storage) => {
                let target = entity_type.map_or_else(|| "*".to_string(), |t| t.to_string());
                Err(MapperError::storage(format!(
                    "injected {operation:?} failure on {target}"
                )))
            }
            Some(FailureKind::Unresolved {
                reference,
                attribute,
            }) => Err(MapperError::UnresolvedReference {
                reference,
                attribute,
            }),
            None => Ok(()),
        }
    }
}

impl Mapper for RecordingMapper {
    fn atomic(&self, work: &mut dyn FnMut() -> MapperResult<()>) -> MapperResult<()> {
        self.record(MapperCall::Atomic);
        self.check(Operation::Atomic, None)?;
        self.inner.atomic(work)
    }

    fn insert(&self, entity: &SharedEntity, parent: Option<&ParentKey>) -> MapperResult<EntityKey> {
        let entity_type = entity.read().entity_type();
        self.record(MapperCall::Insert {
            entity_type,
            parent: parent.cloned(),
        });
        self.check(Operation::Insert, Some(entity_type))?;
        self.inner.insert(entity, parent)
    }

    fn update(&self, entity: &SharedEntity, baseline: &Snapshot) -> MapperResult<()> {
        let (entity_type, key, current) = {
            let guard = entity.read();
            (guard.entity_type(), guard.key(), guard.snapshot())
        };
        self.record(MapperCall::Update {
            entity_type,
            key,
            baseline: baseline.clone(),
            current,
        });
        self.check(Operation::Update, Some(entity_type))?;
        self.inner.update(entity, baseline)
    }

    fn delete(&self, entity: &SharedEntity) -> MapperResult<()> {
        let (entity_type, key) = {
            let guard = entity.read();
            (guard.entity_type(), guard.key())
        };
        self.record(MapperCall::Delete { entity_type, key });
        self.check(Operation::Delete, Some(entity_type))?;
        self.inner.delete(entity)
    }

    fn fetch(&self, schema: &'static EntitySchema, key: EntityKey) -> MapperResult<SharedEntity> {
        let entity_type = schema.entity_type();
        self.record(MapperCall::Fetch { entity_type, key });
        self.check(Operation::Fetch, Some(entity_type))?;
        self.inner.fetch(schema, key)
    }

    fn acquire_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        self.record(MapperCall::AcquireLock {
            entity_type,
            key,
            owner,
        });
        self.check(Operation::AcquireLock, Some(entity_type))?;
        self.inner.acquire_lock(entity_type, key, owner)
    }

    fn release_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        self.record(MapperCall::ReleaseLock {
            entity_type,
            key,
            owner,
        });
        self.check(Operation::ReleaseLock, Some(entity_type))?;
        self.inner.release_lock(entity_type, key, owner)
    }
}
