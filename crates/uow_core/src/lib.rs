//! # UOW Core
//!
//! Unit-of-Work transaction engine.
//!
//! This crate provides:
//! - The [`Entity`] contract and [`SharedEntity`] handles
//! - Static schema descriptors and row translation
//! - The [`Mapper`] storage contract
//! - [`Transaction`]: identity map, snapshot history, commit and rollback
//! - Pessimistic locking through an injected [`LockingPolicy`]
//! - [`TransactionManager`] and the shared [`TransactionRegistry`]
//!
//! ## Usage
//!
//! ```ignore
//! let manager = TransactionManager::new(mapper, schemas);
//! let mut txn = manager.begin();
//! txn.register_new(&order)?;
//! txn.commit()?;
//! txn.complete()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod entity;
mod error;
mod mapper;
pub mod schema;
pub mod transaction;
mod types;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use entity::{
    find_link, share, Entity, EntityLink, Identity, SharedEntity, Snapshot, VersionMarker,
};
pub use error::{ConstraintViolation, CoreError, CoreResult};
pub use mapper::{Mapper, MapperError, MapperResult, ParentKey};
pub use schema::{EntitySchema, SchemaRegistry};
pub use transaction::{
    CommitSummary, LockingMode, LockingPolicy, ObjectState, Transaction, TransactionManager,
    TransactionRegistry, TransactionState,
};
pub use types::{EntityKey, EntityType, TransactionToken};
