//! Test entity and mapper for unit tests.

use crate::entity::{find_link, share, Entity, EntityLink, SharedEntity, Snapshot, VersionMarker};
use crate::error::CoreResult;
use crate::mapper::{Mapper, MapperError, MapperResult, ParentKey};
use crate::schema::{EntitySchema, SchemaRegistry, ValueType};
use crate::types::{EntityKey, EntityType, TransactionToken};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

pub(crate) const WIDGET: EntityType = EntityType::new("Widget");

pub(crate) static WIDGET_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder("Widget", || share(Widget::default()))
        .value("name", ValueType::Text, true)
        .value("count", ValueType::Integer, false)
        .parent("owner", "Widget", false)
        .child("parts", "Widget")
        .build()
});

pub(crate) fn schemas() -> SchemaRegistry {
    SchemaRegistry::new().with(&WIDGET_SCHEMA)
}

#[derive(Default)]
pub(crate) struct Widget {
    pub(crate) key: Option<EntityKey>,
    pub(crate) name: String,
    pub(crate) count: i64,
    pub(crate) owner: Option<SharedEntity>,
    pub(crate) parts: Vec<SharedEntity>,
    pub(crate) version: VersionMarker,
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl Entity for Widget {
    fn schema(&self) -> &'static EntitySchema {
        &WIDGET_SCHEMA
    }

    fn key(&self) -> Option<EntityKey> {
        self.key
    }

    fn set_key(&mut self, key: Option<EntityKey>) {
        self.key = key;
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.key)
            .with("name", self.name.as_str())
            .with("count", self.count)
    }

    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
        self.key = snapshot.key();
        self.name = snapshot.text("name")?.to_string();
        self.count = snapshot.integer("count")?;
        Ok(())
    }

    fn parent_links(&self) -> Vec<EntityLink> {
        self.owner
            .iter()
            .map(|o| EntityLink::new("owner", o.clone()))
            .collect()
    }

    fn relink(&mut self, parents: &[EntityLink]) {
        self.owner = find_link(parents, "owner");
    }

    fn child_links(&self) -> Vec<EntityLink> {
        self.parts
            .iter()
            .map(|p| EntityLink::new("parts", p.clone()))
            .collect()
    }

    fn version(&self) -> &VersionMarker {
        &self.version
    }

    fn version_mut(&mut self) -> &mut VersionMarker {
        &mut self.version
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn widget(name: &str) -> SharedEntity {
    share(Widget {
        name: name.to_string(),
        ..Widget::default()
    })
}

pub(crate) fn keyed_widget(key: i64, name: &str) -> SharedEntity {
    share(Widget {
        key: Some(EntityKey::new(key)),
        name: name.to_string(),
        ..Widget::default()
    })
}

/// Mapper that stores nothing: assigns keys and tracks lock owners.
#[derive(Debug, Default)]
pub(crate) struct NullMapper {
    next_key: AtomicI64,
    locks: Mutex<HashMap<(EntityType, EntityKey), TransactionToken>>,
}

impl NullMapper {
    pub(crate) fn lock_owner(&self, entity_type: EntityType, key: EntityKey) -> Option<TransactionToken> {
        self.locks.lock().get(&(entity_type, key)).copied()
    }
}

impl Mapper for NullMapper {
    fn atomic(&self, work: &mut dyn FnMut() -> MapperResult<()>) -> MapperResult<()> {
        work()
    }

    fn insert(&self, entity: &SharedEntity, _parent: Option<&ParentKey>) -> MapperResult<EntityKey> {
        let key = EntityKey::new(self.next_key.fetch_add(1, Ordering::SeqCst) + 1);
        entity.write().set_key(Some(key));
        Ok(key)
    }

    fn update(&self, _entity: &SharedEntity, _baseline: &Snapshot) -> MapperResult<()> {
        Ok(())
    }

    fn delete(&self, _entity: &SharedEntity) -> MapperResult<()> {
        Ok(())
    }

    fn fetch(&self, schema: &'static EntitySchema, key: EntityKey) -> MapperResult<SharedEntity> {
        let entity = schema.instantiate();
        entity.write().set_key(Some(key));
        Ok(entity)
    }

    fn acquire_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        let mut locks = self.locks.lock();
        match locks.get(&(entity_type, key)) {
            Some(holder) if *holder != owner => Err(MapperError::LockConflict {
                entity_type,
                key,
                holder: *holder,
            }),
            _ => {
                locks.insert((entity_type, key), owner);
                Ok(())
            }
        }
    }

    fn release_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        let mut locks = self.locks.lock();
        if locks.get(&(entity_type, key)) == Some(&owner) {
            locks.remove(&(entity_type, key));
        }
        Ok(())
    }
}
