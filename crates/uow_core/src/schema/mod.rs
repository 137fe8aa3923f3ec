//! Static schema descriptors.
//!
//! Each entity type is described once by an [`EntitySchema`] built at
//! startup (typically in a `LazyLock` static) and collected into a
//! [`SchemaRegistry`].

mod attribute;
mod registry;
pub mod row;

pub use attribute::{
    Attribute, ChildReference, MultiReference, ParentReference, ValueAttribute, ValueType,
};
pub use registry::SchemaRegistry;

use crate::entity::{Entity, SharedEntity};
use crate::error::ConstraintViolation;
use crate::types::EntityType;
use std::fmt;

/// Attribute metadata and factory for one entity type.
pub struct EntitySchema {
    entity_type: EntityType,
    attributes: Vec<Attribute>,
    factory: fn() -> SharedEntity,
}

impl EntitySchema {
    /// Starts building a schema for `name`.
    ///
    /// `factory` creates an empty instance; the mapper fills it from a
    /// stored row when fetching by key.
    #[must_use]
    pub fn builder(name: &'static str, factory: fn() -> SharedEntity) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            schema: Self {
                entity_type: EntityType::new(name),
                attributes: Vec::new(),
                factory,
            },
        }
    }

    /// The described entity type.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// The entity type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.entity_type.name()
    }

    /// All attributes in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Creates an empty instance.
    #[must_use]
    pub fn instantiate(&self) -> SharedEntity {
        (self.factory)()
    }

    /// Stored value fields.
    pub fn value_attributes(&self) -> impl Iterator<Item = &ValueAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Value(v) => Some(v),
            _ => None,
        })
    }

    /// Parent references.
    pub fn parent_references(&self) -> impl Iterator<Item = &ParentReference> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Parent(r) => Some(r),
            _ => None,
        })
    }

    /// Child references.
    pub fn child_references(&self) -> impl Iterator<Item = &ChildReference> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Child(r) => Some(r),
            _ => None,
        })
    }

    /// The parent reference pointing at `target`, if declared.
    #[must_use]
    pub fn parent_reference_to(&self, target: EntityType) -> Option<&ParentReference> {
        self.parent_references().find(|r| r.target == target)
    }

    /// Checks every attribute constraint against the entity's state.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self, entity: &dyn Entity) -> Result<(), ConstraintViolation> {
        let snapshot = entity.snapshot();
        let parents = entity.parent_links();
        for attribute in &self.attributes {
            attribute.check(self.entity_type, &snapshot, &parents)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("entity_type", &self.entity_type)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    /// Declares a stored value field.
    #[must_use]
    pub fn value(mut self, name: &'static str, value_type: ValueType, mandatory: bool) -> Self {
        self.schema.attributes.push(Attribute::Value(ValueAttribute {
            name,
            value_type,
            mandatory,
        }));
        self
    }

    /// Declares a parent reference.
    #[must_use]
    pub fn parent(mut self, name: &'static str, target: &'static str, mandatory: bool) -> Self {
        self.schema.attributes.push(Attribute::Parent(ParentReference {
            name,
            target: EntityType::new(target),
            mandatory,
        }));
        self
    }

    /// Declares an owned child collection.
    #[must_use]
    pub fn child(mut self, name: &'static str, target: &'static str) -> Self {
        self.schema.attributes.push(Attribute::Child(ChildReference {
            name,
            target: EntityType::new(target),
        }));
        self
    }

    /// Declares an association.
    #[must_use]
    pub fn multi(mut self, name: &'static str, target: &'static str) -> Self {
        self.schema.attributes.push(Attribute::Multi(MultiReference {
            name,
            target: EntityType::new(target),
        }));
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn build(self) -> EntitySchema {
        self.schema
    }
}
