//! # UOW Codec
//!
//! Payload values for the UOW engine.
//!
//! This crate provides:
//! - [`Value`], the dynamic type used for entity snapshots and storage rows
//! - CBOR encoding of values, used by mappers that keep rows as bytes
//!
//! ## Usage
//!
//! ```
//! use uow_codec::{from_cbor, to_cbor, Value};
//!
//! let row = Value::map(vec![
//!     (Value::from("name"), Value::from("widget")),
//!     (Value::from("price"), Value::from(10i64)),
//! ]);
//! let bytes = to_cbor(&row).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), row);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use value::Value;
