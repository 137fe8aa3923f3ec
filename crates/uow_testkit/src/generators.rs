//! Property-based test generators using proptest.
//!
//! Strategies produce sample-domain graphs and registration sequences.

use crate::domain;
use proptest::prelude::*;
use uow_core::{ObjectState, SharedEntity};

/// Strategy for line quantities.
pub fn quantity_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000
}

/// Strategy for prices in cents.
pub fn price_strategy() -> impl Strategy<Value = i64> {
    0i64..1_000_000
}

/// Strategy for short lowercase names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,12}").expect("Invalid regex")
}

/// An order with its lines, not yet built into entities.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    /// Order reference.
    pub reference: String,
    /// Quantity of each line.
    pub quantities: Vec<i64>,
}

impl OrderSpec {
    /// Builds the unsaved order and its lines.
    #[must_use]
    pub fn build(&self) -> (SharedEntity, Vec<SharedEntity>) {
        let order = domain::order(&self.reference);
        let lines = self
            .quantities
            .iter()
            .map(|&q| domain::add_line(&order, q, None))
            .collect();
        (order, lines)
    }
}

/// Strategy for orders with up to `max_lines` lines.
pub fn order_spec_strategy(max_lines: usize) -> impl Strategy<Value = OrderSpec> {
    (
        name_strategy(),
        prop::collection::vec(quantity_strategy(), 0..=max_lines),
    )
        .prop_map(|(reference, quantities)| OrderSpec {
            reference,
            quantities,
        })
}

/// One registration call against a persisted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOp {
    /// `register_clean`.
    Clean,
    /// `register_dirty`.
    Dirty,
    /// `register_deleted`.
    Deleted,
    /// `unregister`.
    Unregister,
}

impl RegistrationOp {
    /// The state this call registers, if any.
    #[must_use]
    pub const fn target(self) -> Option<ObjectState> {
        match self {
            Self::Clean => Some(ObjectState::Clean),
            Self::Dirty => Some(ObjectState::Dirty),
            Self::Deleted => Some(ObjectState::Deleted),
            Self::Unregister => None,
        }
    }
}

/// Strategy for a single registration call.
pub fn registration_op_strategy() -> impl Strategy<Value = RegistrationOp> {
    prop_oneof![
        Just(RegistrationOp::Clean),
        Just(RegistrationOp::Dirty),
        Just(RegistrationOp::Deleted),
        Just(RegistrationOp::Unregister),
    ]
}

/// Strategy for `(object index, call)` sequences over `objects` objects.
pub fn registration_sequence_strategy(
    objects: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<(usize, RegistrationOp)>> {
    prop::collection::vec((0..objects.max(1), registration_op_strategy()), 1..=max_len)
}
