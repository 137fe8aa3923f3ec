//! Schema registry.

use super::EntitySchema;
use crate::types::EntityType;
use std::collections::HashMap;

/// The set of entity types the engine accepts.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityType, &'static EntitySchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema, builder style.
    #[must_use]
    pub fn with(mut self, schema: &'static EntitySchema) -> Self {
        self.register(schema);
        self
    }

    /// Adds a schema. A schema with the same name is replaced.
    pub fn register(&mut self, schema: &'static EntitySchema) {
        self.schemas.insert(schema.entity_type(), schema);
    }

    /// Looks up the schema for a type.
    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> Option<&'static EntitySchema> {
        self.schemas.get(&entity_type).copied()
    }

    /// Looks up a schema by type name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&'static EntitySchema> {
        self.schemas
            .iter()
            .find(|(ty, _)| ty.name() == name)
            .map(|(_, schema)| *schema)
    }

    /// Returns `true` if the type is registered.
    #[must_use]
    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.schemas.contains_key(&entity_type)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
