//! Storage contract used by transactions.
//!
//! A [`Mapper`] turns tracked entities into storage operations. The
//! transaction calls it only from inside [`Mapper::atomic`] during commit,
//! plus the lock primitives and `fetch` for pessimistic loads. No entity
//! guard is held across a mapper call.

use crate::entity::{SharedEntity, Snapshot};
use crate::error::ConstraintViolation;
use crate::schema::EntitySchema;
use crate::types::{EntityKey, EntityType, TransactionToken};
use thiserror::Error;

/// Result type for mapper operations.
pub type MapperResult<T> = Result<T, MapperError>;

/// Foreign key handed to a child inserted by cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentKey {
    /// Foreign-key column in the child's row.
    pub column: String,
    /// Key of the freshly inserted parent.
    pub key: EntityKey,
}

impl ParentKey {
    /// Creates a parent key.
    pub fn new(column: impl Into<String>, key: EntityKey) -> Self {
        Self {
            column: column.into(),
            key,
        }
    }
}

/// Errors reported by a mapper.
#[derive(Debug, Error)]
pub enum MapperError {
    /// A referenced entity has no key yet.
    ///
    /// Recoverable: the transaction registers `reference` as new and runs
    /// the commit pass again.
    #[error("unresolved reference through `{attribute}`")]
    UnresolvedReference {
        /// The entity that must be inserted first.
        reference: SharedEntity,
        /// The attribute holding the reference.
        attribute: &'static str,
    },

    /// The identity is locked by another owner.
    #[error("{entity_type}#{key} is locked by {holder}")]
    LockConflict {
        /// Locked entity type.
        entity_type: EntityType,
        /// Locked key.
        key: EntityKey,
        /// Current lock owner.
        holder: TransactionToken,
    },

    /// No stored row for this identity.
    #[error("{entity_type}#{key} not found")]
    NotFound {
        /// Entity type.
        entity_type: EntityType,
        /// Requested key.
        key: EntityKey,
    },

    /// The operation needs a persisted entity.
    #[error("{entity_type} entity has no key")]
    MissingKey {
        /// Entity type.
        entity_type: EntityType,
    },

    /// The entity violates its schema.
    #[error("constraint violation: {0}")]
    Constraint(#[from] ConstraintViolation),

    /// A row could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] uow_codec::CodecError),

    /// The backing store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// The mapper has no table for this type.
    #[error("unknown entity type: {type_name}")]
    UnknownType {
        /// Name of the type.
        type_name: String,
    },
}

impl MapperError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` for the recoverable unresolved-reference case.
    #[must_use]
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. })
    }
}

/// Atomic storage operations over entities.
pub trait Mapper: Send + Sync {
    /// Runs `work` as one atomic storage scope.
    ///
    /// If `work` fails, every change made inside the scope is undone and
    /// the error is returned. A nested call joins the enclosing scope.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work` or by the store itself.
    fn atomic(&self, work: &mut dyn FnMut() -> MapperResult<()>) -> MapperResult<()>;

    /// Inserts the entity, sets its key, and cascades into its child links.
    ///
    /// `parent` carries the foreign key when called for a cascaded child.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::UnresolvedReference`] when a parent link
    /// targets an entity without a key.
    fn insert(&self, entity: &SharedEntity, parent: Option<&ParentKey>) -> MapperResult<EntityKey>;

    /// Persists the difference between `baseline` and the entity's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no stored row.
    fn update(&self, entity: &SharedEntity, baseline: &Snapshot) -> MapperResult<()>;

    /// Removes the entity's stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity has no stored row.
    fn delete(&self, entity: &SharedEntity) -> MapperResult<()>;

    /// Loads an entity by key.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::NotFound`] if no row exists.
    fn fetch(&self, schema: &'static EntitySchema, key: EntityKey) -> MapperResult<SharedEntity>;

    /// Acquires the lock on `(entity_type, key)` for `owner`.
    ///
    /// Never blocks. Re-acquiring a lock the owner already holds succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::LockConflict`] if another owner holds it.
    fn acquire_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()>;

    /// Releases the lock on `(entity_type, key)` held by `owner`.
    ///
    /// Releasing a lock that is not held is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot record the release.
    fn release_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()>;
}
