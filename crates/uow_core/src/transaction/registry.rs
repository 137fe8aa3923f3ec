//! Registry of active transactions.

use super::policy::LockingMode;
use crate::types::TransactionToken;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Registration record for one active transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredTransaction {
    /// The transaction's token.
    pub token: TransactionToken,
    /// Its locking mode.
    pub mode: LockingMode,
    /// When it was created.
    pub opened_at: Instant,
}

/// Shared table of active transactions, keyed by token.
///
/// Cloning yields another handle to the same table. Entries are added when
/// a transaction is created and removed when it is finalized.
#[derive(Debug, Clone, Default)]
pub struct TransactionRegistry {
    active: Arc<RwLock<HashMap<TransactionToken, RegisteredTransaction>>>,
}

impl TransactionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `token` as active.
    pub fn add(&self, token: TransactionToken, mode: LockingMode) {
        self.active.write().insert(
            token,
            RegisteredTransaction {
                token,
                mode,
                opened_at: Instant::now(),
            },
        );
    }

    /// Removes `token`. Returns `false` if it was not registered.
    pub fn remove(&self, token: TransactionToken) -> bool {
        self.active.write().remove(&token).is_some()
    }

    /// Returns `true` if `token` is active.
    #[must_use]
    pub fn contains(&self, token: TransactionToken) -> bool {
        self.active.read().contains_key(&token)
    }

    /// The record for `token`.
    #[must_use]
    pub fn get(&self, token: TransactionToken) -> Option<RegisteredTransaction> {
        self.active.read().get(&token).copied()
    }

    /// Number of active transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Tokens of all active transactions.
    #[must_use]
    pub fn tokens(&self) -> Vec<TransactionToken> {
        self.active.read().keys().copied().collect()
    }
}
