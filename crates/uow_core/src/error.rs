//! Error types for the UOW engine.

use crate::mapper::MapperError;
use crate::transaction::ObjectState;
use crate::types::{EntityKey, EntityType, TransactionToken};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A schema constraint that an entity failed to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity_type}.{attribute}: {message}")]
pub struct ConstraintViolation {
    /// The entity type whose schema declares the attribute.
    pub entity_type: EntityType,
    /// The attribute that failed its check.
    pub attribute: &'static str,
    /// Description of the violation.
    pub message: String,
}

impl ConstraintViolation {
    /// Creates a constraint violation.
    pub fn new(entity_type: EntityType, attribute: &'static str, message: impl Into<String>) -> Self {
        Self {
            entity_type,
            attribute,
            message: message.into(),
        }
    }
}

/// Errors that can occur in UOW engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The transaction has been finalized and accepts no further operations.
    #[error("invalid transaction: {token} has been finalized")]
    InvalidTransaction {
        /// Token of the finalized transaction.
        token: TransactionToken,
    },

    /// The object's type is not a registered entity type.
    #[error("type mismatch: {type_name} is not a registered entity type")]
    TypeMismatch {
        /// Name of the offending type.
        type_name: String,
    },

    /// The identity is already tracked in the requested state.
    #[error("duplicate registration: {entity} is already registered as {state}")]
    DuplicateRegistration {
        /// Description of the entity.
        entity: String,
        /// The state it is already tracked in.
        state: ObjectState,
    },

    /// The entity's key does not fit the requested registration.
    #[error("missing identity: {message}")]
    MissingIdentity {
        /// Description of the mismatch.
        message: String,
    },

    /// A referenced entity could not be inserted ahead of the entity
    /// referring to it.
    #[error("unresolvable reference: {entity} cannot be inserted ahead of its referrer")]
    UnresolvableReference {
        /// Description of the referenced entity.
        entity: String,
    },

    /// Commit kept failing on unresolved references.
    #[error("commit gave up after {attempts} attempts")]
    CommitAttemptsExhausted {
        /// Number of persistence passes that were run.
        attempts: usize,
    },

    /// Entities in one state bucket reference each other in a cycle.
    #[error("reference cycle among {involved} {state} entities")]
    ReferenceCycle {
        /// The bucket being ordered.
        state: ObjectState,
        /// Number of entities that could not be ordered.
        involved: usize,
    },

    /// Another transaction holds the lock on this identity.
    #[error("lock conflict on {entity_type}#{key}: held by {holder}")]
    LockConflict {
        /// Locked entity type.
        entity_type: EntityType,
        /// Locked key.
        key: EntityKey,
        /// The owning transaction.
        holder: TransactionToken,
    },

    /// The entity's version marker is claimed by another transaction.
    #[error("version of {entity} is locked by {holder}")]
    VersionLocked {
        /// Description of the entity.
        entity: String,
        /// The owning transaction.
        holder: TransactionToken,
    },

    /// No snapshot exists for an entry that must be restored.
    #[error("history missing for {identity}: cannot restore")]
    HistoryMissing {
        /// Identity whose history is missing.
        identity: String,
    },

    /// The object is not tracked by this transaction.
    #[error("object not tracked: {entity}")]
    ObjectNotTracked {
        /// Description of the entity.
        entity: String,
    },

    /// The operation is disabled under the active locking policy.
    #[error("illegal operation: {message}")]
    IllegalOperation {
        /// Description of why the operation is disabled.
        message: String,
    },

    /// `complete` was called without a prior commit or rollback.
    #[error("cannot complete {token} without commit or rollback")]
    NotCommitted {
        /// Token of the transaction.
        token: TransactionToken,
    },

    /// A schema constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(#[from] ConstraintViolation),

    /// The mapper failed.
    #[error("mapper error: {0}")]
    Mapper(#[from] MapperError),

    /// A payload could not be read.
    #[error("codec error: {0}")]
    Codec(#[from] uow_codec::CodecError),
}

impl CoreError {
    /// Creates an invalid transaction error.
    pub fn invalid_transaction(token: TransactionToken) -> Self {
        Self::InvalidTransaction { token }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(type_name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            type_name: type_name.into(),
        }
    }

    /// Creates a duplicate registration error.
    pub fn duplicate_registration(entity: impl Into<String>, state: ObjectState) -> Self {
        Self::DuplicateRegistration {
            entity: entity.into(),
            state,
        }
    }

    /// Creates a missing identity error.
    pub fn missing_identity(message: impl Into<String>) -> Self {
        Self::MissingIdentity {
            message: message.into(),
        }
    }

    /// Creates an unresolvable reference error.
    pub fn unresolvable_reference(entity: impl Into<String>) -> Self {
        Self::UnresolvableReference {
            entity: entity.into(),
        }
    }

    /// Creates a history missing error.
    pub fn history_missing(identity: impl Into<String>) -> Self {
        Self::HistoryMissing {
            identity: identity.into(),
        }
    }

    /// Creates an object not tracked error.
    pub fn object_not_tracked(entity: impl Into<String>) -> Self {
        Self::ObjectNotTracked {
            entity: entity.into(),
        }
    }

    /// Creates an illegal operation error.
    pub fn illegal_operation(message: impl Into<String>) -> Self {
        Self::IllegalOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for lock contention, which callers may retry.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(
            self,
            Self::LockConflict { .. }
                | Self::VersionLocked { .. }
                | Self::Mapper(MapperError::LockConflict { .. })
        )
    }
}
