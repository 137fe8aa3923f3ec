//! Attribute descriptors.

use crate::entity::{EntityLink, Snapshot};
use crate::error::ConstraintViolation;
use crate::types::EntityType;
use uow_codec::Value;

/// Primitive type a value attribute must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// `Value::Bool`.
    Bool,
    /// `Value::Integer`.
    Integer,
    /// `Value::Text`.
    Text,
    /// `Value::Bytes`.
    Bytes,
    /// Any value.
    Any,
}

impl ValueType {
    /// Returns `true` if `value` has this type. `Null` never matches.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            _ => false,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Any => "any",
        }
    }
}

/// A plain stored field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueAttribute {
    /// Field name in snapshots and rows.
    pub name: &'static str,
    /// Required value type.
    pub value_type: ValueType,
    /// Whether `Null` is rejected.
    pub mandatory: bool,
}

/// A reference to the entity this one belongs to.
///
/// Stored as a `<name>_id` foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentReference {
    /// Attribute name; also the name of the link.
    pub name: &'static str,
    /// Referenced entity type.
    pub target: EntityType,
    /// Whether the link must be present.
    pub mandatory: bool,
}

impl ParentReference {
    /// Foreign-key column name.
    #[must_use]
    pub fn column(&self) -> String {
        format!("{}_id", self.name)
    }
}

/// Owned children; inserted by cascade, never stored as a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildReference {
    /// Attribute name; also the name of the link.
    pub name: &'static str,
    /// Child entity type.
    pub target: EntityType,
}

/// Many-to-many association; not stored in the entity's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiReference {
    /// Attribute name.
    pub name: &'static str,
    /// Associated entity type.
    pub target: EntityType,
}

/// One declared attribute of an entity schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Stored field.
    Value(ValueAttribute),
    /// Foreign key to a parent.
    Parent(ParentReference),
    /// Owned children.
    Child(ChildReference),
    /// Association.
    Multi(MultiReference),
}

impl Attribute {
    /// The attribute name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Value(a) => a.name,
            Self::Parent(r) => r.name,
            Self::Child(r) => r.name,
            Self::Multi(r) => r.name,
        }
    }

    /// Checks this attribute's constraint against an entity's state.
    ///
    /// # Errors
    ///
    /// Returns a violation for a missing mandatory value or link, or a
    /// value of the wrong type.
    pub fn check(
        &self,
        entity_type: EntityType,
        snapshot: &Snapshot,
        parents: &[EntityLink],
    ) -> Result<(), ConstraintViolation> {
        match self {
            Self::Value(attr) => match snapshot.get(attr.name) {
                None | Some(Value::Null) if attr.mandatory => Err(ConstraintViolation::new(
                    entity_type,
                    attr.name,
                    "mandatory value is missing",
                )),
                Some(value) if !value.is_null() && !attr.value_type.accepts(value) => {
                    Err(ConstraintViolation::new(
                        entity_type,
                        attr.name,
                        format!("expected {}, found {}", attr.value_type.name(), value.kind()),
                    ))
                }
                _ => Ok(()),
            },
            Self::Parent(reference) => {
                if reference.mandatory && !parents.iter().any(|l| l.attribute == reference.name) {
                    return Err(ConstraintViolation::new(
                        entity_type,
                        reference.name,
                        format!("mandatory reference to {} is missing", reference.target),
                    ));
                }
                Ok(())
            }
            Self::Child(_) | Self::Multi(_) => Ok(()),
        }
    }
}
