//! Lease-bounded lock table.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use uow_core::{EntityKey, EntityType, TransactionToken};

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: TransactionToken,
    expires_at: Instant,
}

/// Exclusive locks on `(type, key)` identities.
///
/// Every lock carries a lease. Re-acquiring a held lock renews it; an
/// expired lease counts as free.
#[derive(Debug)]
pub(crate) struct LockTable {
    lease: Duration,
    held: HashMap<(EntityType, EntityKey), Lease>,
}

impl LockTable {
    pub(crate) fn new(lease: Duration) -> Self {
        Self {
            lease,
            held: HashMap::new(),
        }
    }

    /// Takes or renews the lock. Returns the current holder on conflict.
    ///
    /// Expired leases are dropped first.
    pub(crate) fn acquire(
        &mut self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
        now: Instant,
    ) -> Result<(), TransactionToken> {
        self.held.retain(|_, lease| lease.expires_at > now);
        if let Some(lease) = self.held.get(&(entity_type, key)) {
            if lease.owner != owner && lease.expires_at > now {
                return Err(lease.owner);
            }
        }
        self.held.insert(
            (entity_type, key),
            Lease {
                owner,
                expires_at: now + self.lease,
            },
        );
        Ok(())
    }

    /// Drops the lock if `owner` holds it. Returns whether it did.
    pub(crate) fn release(&mut self, entity_type: EntityType, key: EntityKey, owner: TransactionToken) -> bool {
        match self.held.get(&(entity_type, key)) {
            Some(lease) if lease.owner == owner => {
                self.held.remove(&(entity_type, key));
                true
            }
            _ => false,
        }
    }

    /// The owner of an unexpired lock.
    pub(crate) fn holder(&self, entity_type: EntityType, key: EntityKey, now: Instant) -> Option<TransactionToken> {
        self.held
            .get(&(entity_type, key))
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.owner)
    }

    /// Number of unexpired locks.
    pub(crate) fn active(&self, now: Instant) -> usize {
        self.held.values().filter(|lease| lease.expires_at > now).count()
    }
}
