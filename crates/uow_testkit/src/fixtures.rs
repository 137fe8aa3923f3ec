//! Test fixtures.
//!
//! [`TestContext`] wires a [`MemoryMapper`] behind a [`RecordingMapper`]
//! and a [`TransactionManager`] over the sample domain, with helpers to
//! seed stored rows.

use crate::domain::{self, CUSTOMER, PRODUCT};
use crate::recording::RecordingMapper;
use std::sync::Arc;
use uow_codec::Value;
use uow_core::{Config, EntityKey, EntityType, Mapper, Transaction, TransactionManager};
use uow_mapper::{MapperConfig, MemoryMapper};

/// A store, a call recorder and a transaction manager over the sample
/// domain.
#[derive(Debug)]
pub struct TestContext {
    /// The backing store.
    pub store: Arc<MemoryMapper>,
    /// The recorder the manager's transactions talk to.
    pub recorder: Arc<RecordingMapper>,
    /// The transaction manager.
    pub manager: TransactionManager,
}

impl TestContext {
    /// Creates a context with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default(), MapperConfig::default())
    }

    /// Creates a context with explicit engine and mapper configuration.
    #[must_use]
    pub fn with_config(config: Config, mapper_config: MapperConfig) -> Self {
        let store = Arc::new(MemoryMapper::with_config(domain::schemas(), mapper_config));
        let recorder = Arc::new(RecordingMapper::new(Arc::clone(&store)));
        let manager = TransactionManager::new(
            Arc::clone(&recorder) as Arc<dyn Mapper>,
            domain::schemas(),
        )
        .with_config(config);
        Self {
            store,
            recorder,
            manager,
        }
    }

    /// Begins an unlocked transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Begins a pessimistic transaction.
    #[must_use]
    pub fn begin_pessimistic(&self) -> Transaction {
        self.manager.begin_pessimistic()
    }

    /// Stores a product row under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the row cannot be stored.
    pub fn seed_product(&self, key: i64, name: &str, price: i64) -> EntityKey {
        let row = Value::map(vec![
            (Value::from("name"), Value::from(name)),
            (Value::from("price"), Value::from(price)),
        ]);
        self.seed(PRODUCT, key, &row)
    }

    /// Stores a customer row under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the row cannot be stored.
    pub fn seed_customer(&self, key: i64, name: &str) -> EntityKey {
        let row = Value::map(vec![
            (Value::from("name"), Value::from(name)),
            (Value::from("email"), Value::Null),
        ]);
        self.seed(CUSTOMER, key, &row)
    }

    /// Stores an arbitrary row under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the row cannot be stored.
    pub fn seed(&self, entity_type: EntityType, key: i64, row: &Value) -> EntityKey {
        let key = EntityKey::new(key);
        self.store
            .put_row(entity_type, key, row)
            .expect("failed to seed row");
        key
    }

    /// The stored row for an identity.
    ///
    /// # Panics
    ///
    /// Panics if the stored row cannot be decoded.
    #[must_use]
    pub fn row(&self, entity_type: EntityType, key: EntityKey) -> Option<Value> {
        self.store.row(entity_type, key).expect("failed to read row")
    }

    /// Stored integer field of an identity.
    #[must_use]
    pub fn stored_integer(&self, entity_type: EntityType, key: EntityKey, field: &str) -> Option<i64> {
        self.row(entity_type, key)
            .and_then(|row| row.get(field).and_then(Value::as_integer))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` with a fresh [`TestContext`].
pub fn with_context<F, R>(f: F) -> R
where
    F: FnOnce(&TestContext) -> R,
{
    let ctx = TestContext::new();
    f(&ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_product_is_loadable() {
        let ctx = TestContext::new();
        let key = ctx.seed_product(5, "bolt", 10);
        assert_eq!(ctx.stored_integer(PRODUCT, key, "price"), Some(10));

        let mut txn = ctx.begin();
        let p = txn.load_as_dirty(PRODUCT, key).unwrap();
        assert_eq!(domain::price_of(&p), 10);
        txn.abort().unwrap();
    }

    #[test]
    fn seeding_advances_key_sequence() {
        with_context(|ctx| {
            ctx.seed_product(7, "nut", 1);
            let p = domain::product("washer", 2);
            ctx.manager.run(|txn| txn.register_new(&p)).unwrap();
            assert_eq!(domain::key_of(&p), Some(EntityKey::new(8)));
        });
    }
}
