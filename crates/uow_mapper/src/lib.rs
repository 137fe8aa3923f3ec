//! # UOW Mapper
//!
//! In-memory implementation of the [`uow_core::Mapper`] contract.
//!
//! [`MemoryMapper`] keeps one table of CBOR rows per entity type, assigns
//! sequential keys, cascades inserts into owned children, persists
//! updates as field deltas and keeps a lease-bounded lock table for
//! pessimistic transactions. Applied row changes are logged in order
//! and can be inspected with [`MemoryMapper::changes`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod config;
mod locks;
mod memory;

pub use changes::{ChangeEvent, ChangeType};
pub use config::MapperConfig;
pub use memory::MemoryMapper;
