//! Transaction manager.

use super::policy::{LockingPolicy, Pessimistic, Unlocked};
use super::registry::TransactionRegistry;
use super::unit::Transaction;
use crate::config::Config;
use crate::error::CoreResult;
use crate::mapper::Mapper;
use crate::schema::SchemaRegistry;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Creates transactions over one mapper and schema registry.
///
/// The manager is cheap to share; every transaction it begins holds its
/// own handles to the mapper, the schemas and the registry.
pub struct TransactionManager {
    mapper: Arc<dyn Mapper>,
    schemas: Arc<SchemaRegistry>,
    registry: TransactionRegistry,
    config: Config,
}

impl TransactionManager {
    /// Creates a manager with a fresh registry and default config.
    pub fn new(mapper: Arc<dyn Mapper>, schemas: SchemaRegistry) -> Self {
        Self {
            mapper,
            schemas: Arc::new(schemas),
            registry: TransactionRegistry::new(),
            config: Config::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing registry, shared with other managers.
    #[must_use]
    pub fn with_registry(mut self, registry: TransactionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The active-transaction registry.
    #[must_use]
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// The schema registry.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// The mapper.
    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn Mapper> {
        &self.mapper
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Begins a plain unit of work.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        self.begin_with_policy(Box::new(Unlocked))
    }

    /// Begins a pessimistically locked unit of work.
    #[must_use]
    pub fn begin_pessimistic(&self) -> Transaction {
        self.begin_with_policy(Box::new(Pessimistic))
    }

    /// Begins a unit of work under a custom policy.
    #[must_use]
    pub fn begin_with_policy(&self, policy: Box<dyn LockingPolicy>) -> Transaction {
        Transaction::new(
            Arc::clone(&self.mapper),
            Arc::clone(&self.schemas),
            self.registry.clone(),
            policy,
            self.config.clone(),
        )
    }

    /// Runs `f` in a new transaction, then commits and completes it.
    ///
    /// If `f` or the commit fails, the transaction is aborted and the
    /// error returned.
    ///
    /// # Example
    ///
    /// ```ignore
    /// manager.run(|txn| {
    ///     txn.register_new(&order)?;
    ///     Ok(())
    /// })?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, `commit` or `complete`.
    pub fn run<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        let mut txn = self.begin();
        let result = f(&mut txn).and_then(|value| {
            txn.commit()?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                txn.complete()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_error) = txn.abort() {
                    warn!(token = %txn.token(), error = %abort_error, "abort failed");
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("schemas", &self.schemas.len())
            .field("active", &self.registry.active_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
