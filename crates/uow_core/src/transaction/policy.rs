//! Locking policies.
//!
//! A [`LockingPolicy`] is chosen when a transaction is created. It decides
//! whether DIRTY/DELETED registration requires a storage lock and whether
//! new objects get their version marker stamped.

use super::state::ObjectState;
use crate::entity::{describe, SharedEntity};
use crate::error::{CoreError, CoreResult};
use crate::mapper::{Mapper, MapperError};
use crate::types::{EntityKey, EntityType, TransactionToken};
use std::fmt;

/// Which policy a transaction runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockingMode {
    /// Plain unit of work; no storage locks.
    Unlocked,
    /// DIRTY/DELETED objects are locked in storage for the transaction's
    /// lifetime.
    Pessimistic,
}

impl fmt::Display for LockingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unlocked => "unlocked",
            Self::Pessimistic => "pessimistic",
        })
    }
}

/// Lock handling injected into a transaction.
pub trait LockingPolicy: fmt::Debug + Send + Sync {
    /// The policy's mode.
    fn mode(&self) -> LockingMode;

    /// Checks whether `register_<state>` may be called directly.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalOperation`] if the policy requires the
    /// `load_as_*` path instead.
    fn check_direct_registration(&self, state: ObjectState) -> CoreResult<()>;

    /// Takes the lock on `(entity_type, key)` for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockConflict`] if another owner holds it.
    fn acquire(
        &self,
        mapper: &dyn Mapper,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> CoreResult<()>;

    /// Releases a lock taken by [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// Returns the mapper's error if the release fails.
    fn release(
        &self,
        mapper: &dyn Mapper,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> CoreResult<()>;

    /// Marks a newly registered object as owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionLocked`] if another owner claimed it.
    fn stamp_new(&self, entity: &SharedEntity, owner: TransactionToken) -> CoreResult<()>;
}

/// No locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlocked;

impl LockingPolicy for Unlocked {
    fn mode(&self) -> LockingMode {
        LockingMode::Unlocked
    }

    fn check_direct_registration(&self, _state: ObjectState) -> CoreResult<()> {
        Ok(())
    }

    fn acquire(
        &self,
        _mapper: &dyn Mapper,
        _entity_type: EntityType,
        _key: EntityKey,
        _owner: TransactionToken,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn release(
        &self,
        _mapper: &dyn Mapper,
        _entity_type: EntityType,
        _key: EntityKey,
        _owner: TransactionToken,
    ) -> CoreResult<()> {
        Ok(())
    }

    fn stamp_new(&self, _entity: &SharedEntity, _owner: TransactionToken) -> CoreResult<()> {
        Ok(())
    }
}

/// Acquire-before-use locking through the mapper.
///
/// Persisted objects can only become DIRTY or DELETED through
/// `load_as_dirty`/`load_as_deleted`, which lock them first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pessimistic;

impl LockingPolicy for Pessimistic {
    fn mode(&self) -> LockingMode {
        LockingMode::Pessimistic
    }

    fn check_direct_registration(&self, state: ObjectState) -> CoreResult<()> {
        match state {
            ObjectState::Dirty | ObjectState::Deleted => Err(CoreError::illegal_operation(format!(
                "register_{state} is disabled under pessimistic locking; use load_as_{state}"
            ))),
            ObjectState::New | ObjectState::Clean => Ok(()),
        }
    }

    fn acquire(
        &self,
        mapper: &dyn Mapper,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> CoreResult<()> {
        mapper
            .acquire_lock(entity_type, key, owner)
            .map_err(|e| match e {
                MapperError::LockConflict {
                    entity_type,
                    key,
                    holder,
                } => CoreError::LockConflict {
                    entity_type,
                    key,
                    holder,
                },
                other => other.into(),
            })
    }

    fn release(
        &self,
        mapper: &dyn Mapper,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> CoreResult<()> {
        mapper.release_lock(entity_type, key, owner)?;
        Ok(())
    }

    fn stamp_new(&self, entity: &SharedEntity, owner: TransactionToken) -> CoreResult<()> {
        let mut guard = entity.write();
        match guard.version_mut().lock(owner) {
            Ok(()) => Ok(()),
            Err(holder) => Err(CoreError::VersionLocked {
                entity: describe(&*guard),
                holder,
            }),
        }
    }
}
