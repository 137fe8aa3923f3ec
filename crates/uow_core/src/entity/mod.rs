//! Entity contract consumed by the engine.
//!
//! Domain types implement [`Entity`] and are shared with the engine as
//! [`SharedEntity`] handles. The engine never inspects fields directly;
//! it works through snapshots, links and the version marker.

mod identity;
mod snapshot;
mod version;

pub use identity::Identity;
pub use snapshot::Snapshot;
pub use version::VersionMarker;

use crate::error::CoreResult;
use crate::schema::EntitySchema;
use crate::types::{EntityKey, EntityType};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared, lockable handle to an entity.
///
/// The caller and the transaction hold clones of the same handle, so
/// rollback and key assignment are visible to the caller.
pub type SharedEntity = Arc<RwLock<dyn Entity>>;

/// Wraps an entity into a [`SharedEntity`] handle.
pub fn share<E: Entity + 'static>(entity: E) -> SharedEntity {
    Arc::new(RwLock::new(entity))
}

/// A declared reference from one entity to another.
#[derive(Debug, Clone)]
pub struct EntityLink {
    /// The schema attribute this link belongs to.
    pub attribute: &'static str,
    /// The referenced entity.
    pub target: SharedEntity,
}

impl EntityLink {
    /// Creates a link through `attribute`.
    pub fn new(attribute: &'static str, target: SharedEntity) -> Self {
        Self { attribute, target }
    }
}

/// A domain object the engine can track and persist.
///
/// Implementations must keep `snapshot` and `restore` symmetric: restoring
/// a snapshot and taking a new one yields an equal snapshot.
pub trait Entity: fmt::Debug + Send + Sync {
    /// The statically built schema for this entity's type.
    fn schema(&self) -> &'static EntitySchema;

    /// The declared entity type.
    fn entity_type(&self) -> EntityType {
        self.schema().entity_type()
    }

    /// The persisted key, or `None` if the entity was never inserted.
    fn key(&self) -> Option<EntityKey>;

    /// Sets or clears the persisted key.
    fn set_key(&mut self, key: Option<EntityKey>);

    /// Copies the entity's full state out as a value snapshot.
    fn snapshot(&self) -> Snapshot;

    /// Overwrites the entity's full state from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not fit this entity's schema.
    fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()>;

    /// Links to parent entities (declared parent references).
    fn parent_links(&self) -> Vec<EntityLink> {
        Vec::new()
    }

    /// Links to owned child entities (declared child references).
    fn child_links(&self) -> Vec<EntityLink> {
        Vec::new()
    }

    /// Points the parent references at `parents`, replacing the current
    /// links. Rollback calls this with the links captured alongside the
    /// restored snapshot.
    ///
    /// Entities without parent references can keep the default.
    fn relink(&mut self, parents: &[EntityLink]) {
        let _ = parents;
    }

    /// The optimistic version marker.
    fn version(&self) -> &VersionMarker;

    /// Mutable access to the version marker.
    fn version_mut(&mut self) -> &mut VersionMarker;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The target of the link through `attribute`, if present.
#[must_use]
pub fn find_link(links: &[EntityLink], attribute: &str) -> Option<SharedEntity> {
    links
        .iter()
        .find(|l| l.attribute == attribute)
        .map(|l| Arc::clone(&l.target))
}

/// Returns `true` if both link lists point at the same targets through
/// the same attributes.
#[must_use]
pub fn same_links(a: &[EntityLink], b: &[EntityLink]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.attribute == y.attribute && Arc::ptr_eq(&x.target, &y.target))
}

/// Short human-readable label: `Product#5` or `Product(unsaved)`.
pub fn describe(entity: &dyn Entity) -> String {
    match entity.key() {
        Some(key) => format!("{}#{}", entity.entity_type(), key),
        None => format!("{}(unsaved)", entity.entity_type()),
    }
}

/// Runs `f` with shared access to the concrete entity behind a handle.
///
/// Returns `None` if the handle holds a different type.
pub fn with_ref<E: Entity + 'static, R>(entity: &SharedEntity, f: impl FnOnce(&E) -> R) -> Option<R> {
    let guard = entity.read();
    guard.as_any().downcast_ref::<E>().map(f)
}

/// Runs `f` with mutable access to the concrete entity behind a handle.
///
/// Returns `None` if the handle holds a different type.
pub fn with_mut<E: Entity + 'static, R>(
    entity: &SharedEntity,
    f: impl FnOnce(&mut E) -> R,
) -> Option<R> {
    let mut guard = entity.write();
    guard.as_any_mut().downcast_mut::<E>().map(f)
}
