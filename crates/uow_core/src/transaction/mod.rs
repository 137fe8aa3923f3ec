//! Transactions and their collaborators.
//!
//! - [`ObjectTracker`]: identity map of tracked objects and their states
//! - [`ObjectHistory`]: snapshot log used for diffs and rollback
//! - [`TransactionRegistry`]: shared table of active transactions
//! - [`Transaction`]: the unit of work
//! - [`TransactionManager`]: begins transactions

mod history;
mod manager;
mod policy;
mod registry;
mod state;
mod tracker;
mod unit;

pub use history::ObjectHistory;
pub use manager::TransactionManager;
pub use policy::{LockingMode, LockingPolicy, Pessimistic, Unlocked};
pub use registry::{RegisteredTransaction, TransactionRegistry};
pub use state::{CommitSummary, ObjectState, Outcome, TrackedEntry, TransactionState};
pub use tracker::ObjectTracker;
pub use unit::Transaction;
