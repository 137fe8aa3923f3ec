//! Lock contention helpers.
//!
//! Runs pessimistic read-modify-write transactions from several threads
//! against one stored product and reports how many won their lock.

use crate::domain::{self, PRODUCT};
use crate::fixtures::TestContext;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use uow_core::{CoreResult, EntityKey};

/// Result of a contention run.
#[derive(Debug, Clone)]
pub struct ContentionResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions refused with a lock conflict.
    pub conflicts: usize,
    /// Transactions that failed for any other reason.
    pub failed: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ContentionResult {
    /// Total attempted transactions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.committed + self.conflicts + self.failed
    }
}

/// Configuration for a contention run.
#[derive(Debug, Clone)]
pub struct ContentionConfig {
    /// Number of threads.
    pub threads: usize,
    /// Transactions per thread.
    pub rounds: usize,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            rounds: 25,
        }
    }
}

/// Increments the price of product `key` from many threads at once.
///
/// Every transaction loads the product for update under a pessimistic
/// lock, adds one to its price, commits and completes. A transaction that
/// meets a held lock gives up.
pub fn contend_on_product(ctx: &TestContext, key: EntityKey, config: &ContentionConfig) -> ContentionResult {
    let committed = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..config.rounds {
                    match bump_price(ctx, key) {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(e) if e.is_lock_conflict() => conflicts.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    ContentionResult {
        committed: committed.into_inner(),
        conflicts: conflicts.into_inner(),
        failed: failed.into_inner(),
        duration: start.elapsed(),
    }
}

fn bump_price(ctx: &TestContext, key: EntityKey) -> CoreResult<()> {
    let mut txn = ctx.begin_pessimistic();
    let result = txn.load_as_dirty(PRODUCT, key).and_then(|product| {
        domain::set_price(&product, domain::price_of(&product) + 1);
        txn.commit().map(|_| ())
    });
    match result {
        Ok(()) => txn.complete(),
        Err(e) => {
            txn.abort()?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_commit_is_counted_once() {
        let ctx = TestContext::new();
        let key = ctx.seed_product(1, "bolt", 0);

        let result = contend_on_product(
            &ctx,
            key,
            &ContentionConfig {
                threads: 4,
                rounds: 10,
            },
        );

        assert_eq!(result.total(), 40);
        assert_eq!(result.failed, 0);
        assert!(result.committed >= 1);
        let price = ctx.stored_integer(PRODUCT, key, "price").unwrap();
        assert_eq!(price, result.committed as i64);
        assert_eq!(ctx.store.active_locks(), 0);
    }
}
