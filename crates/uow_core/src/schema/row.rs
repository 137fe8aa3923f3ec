//! Translation between entities and storage rows.
//!
//! A row is a `Value::Map` holding every value attribute plus one
//! `<name>_id` column per parent reference. Child and multi references are
//! not part of the row.

use super::EntitySchema;
use crate::entity::{Entity, SharedEntity, Snapshot};
use crate::mapper::{MapperError, MapperResult, ParentKey};
use crate::types::EntityKey;
use uow_codec::{CodecError, CodecResult, Value};

/// Builds the storage row for an entity.
///
/// A parent link whose target has no key is satisfied by `parent` when the
/// columns match; otherwise the link is reported unresolved.
///
/// # Errors
///
/// Returns [`MapperError::UnresolvedReference`] for a link to an unsaved
/// entity.
pub fn to_row(
    schema: &EntitySchema,
    entity: &SharedEntity,
    parent: Option<&ParentKey>,
) -> MapperResult<Value> {
    let (snapshot, links) = {
        let guard = entity.read();
        (guard.snapshot(), guard.parent_links())
    };

    let mut row = Value::empty_map();
    for attr in schema.value_attributes() {
        let value = snapshot.get(attr.name).cloned().unwrap_or(Value::Null);
        row.insert(attr.name, value);
    }

    for reference in schema.parent_references() {
        let column = reference.column();
        let given = parent.filter(|p| p.column == column).map(|p| p.key);
        let key = match links.iter().find(|l| l.attribute == reference.name) {
            Some(link) => match link.target.read().key().or(given) {
                Some(key) => Some(key),
                None => {
                    return Err(MapperError::UnresolvedReference {
                        reference: link.target.clone(),
                        attribute: reference.name,
                    })
                }
            },
            None => given,
        };
        row.insert(&column, Value::from(key.map(EntityKey::as_i64)));
    }

    Ok(row)
}

/// Rebuilds an entity snapshot from a stored row.
///
/// # Errors
///
/// Returns an error if `row` is not a map.
pub fn row_to_snapshot(schema: &EntitySchema, key: EntityKey, row: &Value) -> CodecResult<Snapshot> {
    if row.as_map().is_none() {
        return Err(CodecError::unexpected_type("map", row.kind()));
    }
    let mut snapshot = Snapshot::new(Some(key));
    for attr in schema.value_attributes() {
        snapshot = snapshot.with(attr.name, row.get(attr.name).cloned().unwrap_or(Value::Null));
    }
    Ok(snapshot)
}

/// The entity's snapshot plus one `<name>_id` column per parent reference.
///
/// A reassigned or cleared reference changes its column, so comparing two
/// captures detects reference edits that [`Entity::snapshot`] alone cannot
/// see. A link to an unsaved entity is captured as `Null`.
#[must_use]
pub fn capture(entity: &dyn Entity) -> Snapshot {
    let links = entity.parent_links();
    let mut snapshot = entity.snapshot();
    for reference in entity.schema().parent_references() {
        let key = links
            .iter()
            .find(|l| l.attribute == reference.name)
            .and_then(|l| l.target.read().key());
        snapshot = snapshot.with(&reference.column(), key.map(EntityKey::as_i64));
    }
    snapshot
}

/// Foreign-key value stored in `column`, if any.
#[must_use]
pub fn foreign_key(row: &Value, column: &str) -> Option<EntityKey> {
    row.get(column).and_then(Value::as_integer).map(EntityKey::new)
}
