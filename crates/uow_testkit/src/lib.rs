//! # UOW Testkit
//!
//! Test utilities for the UOW engine.
//!
//! This crate provides:
//! - A sample order-management domain with static schemas
//! - A call-recording mapper with failure injection
//! - Test fixtures wiring store, recorder and transaction manager
//! - Property-based test generators using proptest
//! - Lock contention helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use uow_testkit::prelude::*;
//!
//! #[test]
//! fn inserts_order() {
//!     with_context(|ctx| {
//!         let order = order("A-1");
//!         ctx.manager.run(|txn| txn.register_new(&order)).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod domain;
pub mod fixtures;
pub mod generators;
pub mod recording;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::domain::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;
pub use stress::*;
