//! In-memory mapper.

use crate::changes::{ChangeEvent, ChangeType};
use crate::config::MapperConfig;
use crate::locks::LockTable;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use uow_codec::{from_cbor, to_cbor, Value};
use uow_core::schema::{row, EntitySchema, ParentReference, SchemaRegistry};
use uow_core::{
    EntityKey, EntityType, Mapper, MapperError, MapperResult, ParentKey, SharedEntity, Snapshot,
    TransactionToken,
};

/// Rows of one entity type, stored as CBOR.
#[derive(Debug, Clone)]
struct Table {
    next_key: i64,
    rows: BTreeMap<EntityKey, Vec<u8>>,
}

impl Table {
    fn new(first_key: i64) -> Self {
        Self {
            next_key: first_key,
            rows: BTreeMap::new(),
        }
    }
}

/// Tables plus the change log; restored together when a scope fails.
#[derive(Debug, Clone, Default)]
struct Store {
    tables: HashMap<EntityType, Table>,
    changes: Vec<ChangeEvent>,
}

impl Store {
    fn record(&mut self, entity_type: EntityType, key: EntityKey, change_type: ChangeType) {
        let sequence = self.changes.len() as u64 + 1;
        self.changes.push(ChangeEvent {
            sequence,
            entity_type,
            key,
            change_type,
        });
    }
}

/// State captured when the outermost atomic scope opens.
#[derive(Debug)]
struct Scope {
    saved: Store,
    assigned: Vec<SharedEntity>,
}

/// A table store held in memory.
///
/// Suitable for tests and for running the engine without a database.
/// Rows are kept per entity type as CBOR-encoded maps. Keys are assigned
/// sequentially per table starting at [`MapperConfig::first_key`].
///
/// # Atomic scopes
///
/// [`Mapper::atomic`] snapshots every table when the outermost scope
/// opens. If the work fails, the tables are restored and every key
/// assigned inside the scope is cleared from its entity. Only one thread
/// can be inside a scope at a time; other threads' storage calls wait.
///
/// # Example
///
/// ```ignore
/// let mapper = Arc::new(MemoryMapper::new(schemas.clone()));
/// let manager = TransactionManager::new(mapper.clone(), schemas);
/// ```
pub struct MemoryMapper {
    schemas: SchemaRegistry,
    config: MapperConfig,
    gate: ReentrantMutex<()>,
    store: Mutex<Store>,
    scope: Mutex<Option<Scope>>,
    locks: Mutex<LockTable>,
}

impl MemoryMapper {
    /// Creates an empty store for the given schemas.
    #[must_use]
    pub fn new(schemas: SchemaRegistry) -> Self {
        Self::with_config(schemas, MapperConfig::default())
    }

    /// Creates an empty store with a custom configuration.
    #[must_use]
    pub fn with_config(schemas: SchemaRegistry, config: MapperConfig) -> Self {
        Self {
            schemas,
            locks: Mutex::new(LockTable::new(config.lock_lease)),
            config,
            gate: ReentrantMutex::new(()),
            store: Mutex::new(Store::default()),
            scope: Mutex::new(None),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Stores `row` under an explicit key, replacing any existing row.
    ///
    /// Later inserts into the table get keys above `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown or the row cannot be
    /// encoded.
    pub fn put_row(&self, entity_type: EntityType, key: EntityKey, row: &Value) -> MapperResult<()> {
        self.ensure_known(entity_type)?;
        let bytes = to_cbor(row)?;
        let _gate = self.gate.lock();
        let mut store = self.store.lock();
        let table = store
            .tables
            .entry(entity_type)
            .or_insert_with(|| Table::new(self.config.first_key));
        table.rows.insert(key, bytes);
        table.next_key = table.next_key.max(key.as_i64() + 1);
        Ok(())
    }

    /// The stored row for an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored bytes cannot be decoded.
    pub fn row(&self, entity_type: EntityType, key: EntityKey) -> MapperResult<Option<Value>> {
        let bytes = self
            .store
            .lock()
            .tables
            .get(&entity_type)
            .and_then(|t| t.rows.get(&key).cloned());
        match bytes {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of stored rows of `entity_type`.
    #[must_use]
    pub fn row_count(&self, entity_type: EntityType) -> usize {
        self.store
            .lock()
            .tables
            .get(&entity_type)
            .map_or(0, |t| t.rows.len())
    }

    /// Keys of all stored rows of `entity_type`, ascending.
    #[must_use]
    pub fn keys(&self, entity_type: EntityType) -> Vec<EntityKey> {
        self.store
            .lock()
            .tables
            .get(&entity_type)
            .map(|t| t.rows.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every applied row change, oldest first.
    #[must_use]
    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.store.lock().changes.clone()
    }

    /// The owner of an unexpired lock on an identity.
    #[must_use]
    pub fn lock_holder(&self, entity_type: EntityType, key: EntityKey) -> Option<TransactionToken> {
        self.locks.lock().holder(entity_type, key, Instant::now())
    }

    /// Number of unexpired locks.
    #[must_use]
    pub fn active_locks(&self) -> usize {
        self.locks.lock().active(Instant::now())
    }

    fn ensure_known(&self, entity_type: EntityType) -> MapperResult<()> {
        if self.schemas.contains(entity_type) {
            Ok(())
        } else {
            Err(MapperError::UnknownType {
                type_name: entity_type.name().to_string(),
            })
        }
    }

    fn record_assigned(&self, entity: &SharedEntity) {
        if let Some(scope) = self.scope.lock().as_mut() {
            scope.assigned.push(Arc::clone(entity));
        }
    }

    fn read_row(&self, entity_type: EntityType, key: EntityKey) -> MapperResult<Value> {
        self.row(entity_type, key)?
            .ok_or(MapperError::NotFound { entity_type, key })
    }

    fn write_row(&self, entity_type: EntityType, key: EntityKey, row: &Value) -> MapperResult<()> {
        let bytes = to_cbor(row)?;
        let mut store = self.store.lock();
        let table = store
            .tables
            .get_mut(&entity_type)
            .ok_or(MapperError::NotFound { entity_type, key })?;
        table.rows.insert(key, bytes);
        store.record(entity_type, key, ChangeType::Update);
        Ok(())
    }
}

impl Mapper for MemoryMapper {
    fn atomic(&self, work: &mut dyn FnMut() -> MapperResult<()>) -> MapperResult<()> {
        let _gate = self.gate.lock();

        let outermost = {
            let mut scope = self.scope.lock();
            if scope.is_some() {
                false
            } else {
                *scope = Some(Scope {
                    saved: self.store.lock().clone(),
                    assigned: Vec::new(),
                });
                true
            }
        };

        let result = work();
        if !outermost {
            return result;
        }

        let scope = self.scope.lock().take();
        if let (Err(e), Some(scope)) = (&result, scope) {
            trace!(error = %e, assigned = scope.assigned.len(), "atomic scope rolled back");
            *self.store.lock() = scope.saved;
            for entity in &scope.assigned {
                entity.write().set_key(None);
            }
        }
        result
    }

    fn insert(&self, entity: &SharedEntity, parent: Option<&ParentKey>) -> MapperResult<EntityKey> {
        let _gate = self.gate.lock();
        let (schema, entity_type) = {
            let guard = entity.read();
            if guard.key().is_some() {
                return Err(MapperError::storage(format!(
                    "{} is already persisted",
                    uow_core::entity::describe(&*guard)
                )));
            }
            guard.schema().validate(&*guard)?;
            (guard.schema(), guard.entity_type())
        };
        self.ensure_known(entity_type)?;

        let row = row::to_row(schema, entity, parent)?;
        let bytes = to_cbor(&row)?;
        let key = {
            let mut store = self.store.lock();
            let table = store
                .tables
                .entry(entity_type)
                .or_insert_with(|| Table::new(self.config.first_key));
            let key = EntityKey::new(table.next_key);
            table.next_key += 1;
            table.rows.insert(key, bytes);
            store.record(entity_type, key, ChangeType::Insert);
            key
        };
        entity.write().set_key(Some(key));
        self.record_assigned(entity);
        trace!(%entity_type, %key, "inserted");

        let children = entity.read().child_links();
        for link in children {
            let child_schema = {
                let child = link.target.read();
                if child.key().is_some() {
                    continue;
                }
                child.schema()
            };
            let column = child_schema
                .parent_reference_to(entity_type)
                .map(ParentReference::column)
                .unwrap_or_else(|| format!("{}_id", entity_type.name().to_lowercase()));
            self.insert(&link.target, Some(&ParentKey::new(column, key)))?;
        }

        Ok(key)
    }

    fn update(&self, entity: &SharedEntity, baseline: &Snapshot) -> MapperResult<()> {
        let _gate = self.gate.lock();
        let (schema, entity_type, key, current, links) = {
            let guard = entity.read();
            (
                guard.schema(),
                guard.entity_type(),
                guard.key(),
                guard.snapshot(),
                guard.parent_links(),
            )
        };
        let key = key.ok_or(MapperError::MissingKey { entity_type })?;

        let mut stored = self.read_row(entity_type, key)?;
        let changed: Vec<&str> = current.changed_fields(baseline);
        for attr in schema.value_attributes() {
            if changed.contains(&attr.name) {
                stored.insert(attr.name, current.get(attr.name).cloned().unwrap_or(Value::Null));
            }
        }

        // Linked references are rewritten; a reference cleared since the
        // baseline capture is nulled. Cascade-assigned keys stay put.
        if schema.parent_references().next().is_some() {
            let fresh = row::to_row(schema, entity, None)?;
            for reference in schema.parent_references() {
                let column = reference.column();
                let value = fresh.get(&column).cloned().unwrap_or(Value::Null);
                let linked = links.iter().any(|l| l.attribute == reference.name);
                let moved = baseline.get(&column).is_some_and(|before| *before != value);
                if linked || moved {
                    stored.insert(&column, value);
                }
            }
        }

        self.write_row(entity_type, key, &stored)?;
        trace!(%entity_type, %key, changed = changed.len(), "updated");
        Ok(())
    }

    fn delete(&self, entity: &SharedEntity) -> MapperResult<()> {
        let _gate = self.gate.lock();
        let (entity_type, key) = {
            let guard = entity.read();
            (guard.entity_type(), guard.key())
        };
        let key = key.ok_or(MapperError::MissingKey { entity_type })?;

        {
            let mut store = self.store.lock();
            let removed = store
                .tables
                .get_mut(&entity_type)
                .and_then(|t| t.rows.remove(&key));
            if removed.is_none() {
                return Err(MapperError::NotFound { entity_type, key });
            }
            store.record(entity_type, key, ChangeType::Delete);
        }
        trace!(%entity_type, %key, "deleted");
        Ok(())
    }

    fn fetch(&self, schema: &'static EntitySchema, key: EntityKey) -> MapperResult<SharedEntity> {
        let entity_type = schema.entity_type();
        self.ensure_known(entity_type)?;
        let stored = self.read_row(entity_type, key)?;
        let snapshot = row::row_to_snapshot(schema, key, &stored)?;

        let entity = schema.instantiate();
        entity
            .write()
            .restore(&snapshot)
            .map_err(|e| MapperError::storage(format!("cannot load {entity_type}#{key}: {e}")))?;
        trace!(%entity_type, %key, "fetched");
        Ok(entity)
    }

    fn acquire_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        self.locks
            .lock()
            .acquire(entity_type, key, owner, Instant::now())
            .map_err(|holder| MapperError::LockConflict {
                entity_type,
                key,
                holder,
            })?;
        trace!(%entity_type, %key, owner = %owner, "lock acquired");
        Ok(())
    }

    fn release_lock(
        &self,
        entity_type: EntityType,
        key: EntityKey,
        owner: TransactionToken,
    ) -> MapperResult<()> {
        if self.locks.lock().release(entity_type, key, owner) {
            trace!(%entity_type, %key, owner = %owner, "lock released");
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMapper")
            .field("config", &self.config)
            .field("tables", &self.store.lock().tables.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::LazyLock;
    use std::time::Duration;
    use uow_core::schema::ValueType;
    use uow_core::{share, CoreResult, Entity, EntityLink, VersionMarker};

    const FOLDER: EntityType = EntityType::new("Folder");
    const NOTE: EntityType = EntityType::new("Note");

    static FOLDER_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
        EntitySchema::builder("Folder", || share(Node::new(&FOLDER_SCHEMA, "")))
            .value("title", ValueType::Text, true)
            .child("notes", "Note")
            .build()
    });

    static NOTE_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
        EntitySchema::builder("Note", || share(Node::new(&NOTE_SCHEMA, "")))
            .value("title", ValueType::Text, true)
            .parent("folder", "Folder", true)
            .build()
    });

    /// Folder or note, depending on its schema.
    struct Node {
        schema: &'static EntitySchema,
        key: Option<EntityKey>,
        title: String,
        parent: Option<SharedEntity>,
        children: Vec<SharedEntity>,
        version: VersionMarker,
    }

    impl std::fmt::Debug for Node {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}({:?}, {})", self.schema.name(), self.key, self.title)
        }
    }

    impl Node {
        fn new(schema: &'static EntitySchema, title: &str) -> Self {
            Self {
                schema,
                key: None,
                title: title.to_string(),
                parent: None,
                children: Vec::new(),
                version: VersionMarker::new(),
            }
        }
    }

    impl Entity for Node {
        fn schema(&self) -> &'static EntitySchema {
            self.schema
        }
        fn key(&self) -> Option<EntityKey> {
            self.key
        }
        fn set_key(&mut self, key: Option<EntityKey>) {
            self.key = key;
        }
        fn snapshot(&self) -> Snapshot {
            Snapshot::new(self.key).with("title", self.title.as_str())
        }
        fn restore(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
            self.key = snapshot.key();
            self.title = snapshot.text("title")?.to_string();
            Ok(())
        }
        fn parent_links(&self) -> Vec<EntityLink> {
            self.parent
                .iter()
                .map(|p| EntityLink::new("folder", p.clone()))
                .collect()
        }
        fn relink(&mut self, parents: &[EntityLink]) {
            self.parent = uow_core::find_link(parents, "folder");
        }
        fn child_links(&self) -> Vec<EntityLink> {
            self.children
                .iter()
                .map(|c| EntityLink::new("notes", c.clone()))
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

    fn mapper() -> MemoryMapper {
        MemoryMapper::new(SchemaRegistry::new().with(&FOLDER_SCHEMA).with(&NOTE_SCHEMA))
    }

    fn folder(title: &str) -> SharedEntity {
        share(Node::new(&FOLDER_SCHEMA, title))
    }

    fn note(title: &str) -> SharedEntity {
        share(Node::new(&NOTE_SCHEMA, title))
    }

    fn set_title(entity: &SharedEntity, title: &str) {
        uow_core::entity::with_mut::<Node, _>(entity, |n| n.title = title.to_string()).unwrap();
    }

    fn folder_with_notes(titles: &[&str]) -> (SharedEntity, Vec<SharedEntity>) {
        let parent = folder("inbox");
        let notes: Vec<_> = titles.iter().map(|t| note(t)).collect();
        for n in &notes {
            uow_core::entity::with_mut::<Node, _>(n, |node| node.parent = Some(parent.clone())).unwrap();
        }
        uow_core::entity::with_mut::<Node, _>(&parent, |node| node.children = notes.clone()).unwrap();
        (parent, notes)
    }

    #[test]
    fn insert_assigns_sequential_keys() {
        let m = mapper();
        let a = folder("a");
        let b = folder("b");

        assert_eq!(m.insert(&a, None).unwrap(), EntityKey::new(1));
        assert_eq!(m.insert(&b, None).unwrap(), EntityKey::new(2));
        assert_eq!(a.read().key(), Some(EntityKey::new(1)));
        assert_eq!(m.row_count(FOLDER), 2);
    }

    #[test]
    fn insert_cascades_into_children_with_foreign_key() {
        let m = mapper();
        let (parent, notes) = folder_with_notes(&["one", "two"]);

        let key = m.insert(&parent, None).unwrap();
        assert_eq!(m.row_count(NOTE), 2);
        for n in &notes {
            let note_key = n.read().key().unwrap();
            let stored = m.row(NOTE, note_key).unwrap().unwrap();
            assert_eq!(row::foreign_key(&stored, "folder_id"), Some(key));
        }
    }

    #[test]
    fn constraint_violation_rejects_insert() {
        let m = mapper();
        let orphan = note("no folder");

        assert!(matches!(
            m.insert(&orphan, None),
            Err(MapperError::Constraint(violation)) if violation.attribute == "folder"
        ));
        assert_eq!(orphan.read().key(), None);
        assert_eq!(m.row_count(NOTE), 0);
    }

    #[test]
    fn unresolved_parent_is_reported() {
        let m = mapper();
        let parent = folder("unsaved");
        let n = note("orphan");
        uow_core::entity::with_mut::<Node, _>(&n, |node| node.parent = Some(parent.clone())).unwrap();

        let err = m.insert(&n, None).unwrap_err();
        assert!(err.is_unresolved_reference());
        assert_eq!(m.row_count(NOTE), 0);
    }

    #[test]
    fn failed_scope_restores_tables_and_keys() {
        let m = mapper();
        let kept = folder("kept");
        m.insert(&kept, None).unwrap();

        let (parent, notes) = folder_with_notes(&["x"]);
        let result = m.atomic(&mut || -> MapperResult<()> {
            m.insert(&parent, None)?;
            Err(MapperError::storage("disk full"))
        });

        assert!(result.is_err());
        assert_eq!(m.row_count(FOLDER), 1);
        assert_eq!(m.row_count(NOTE), 0);
        assert_eq!(parent.read().key(), None);
        assert_eq!(notes[0].read().key(), None);
        assert_eq!(kept.read().key(), Some(EntityKey::new(1)));
    }

    #[test]
    fn change_log_orders_parent_before_children() {
        let m = mapper();
        let (parent, _notes) = folder_with_notes(&["one", "two"]);
        m.insert(&parent, None).unwrap();

        let changes = m.changes();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].entity_type, FOLDER);
        assert!(changes.iter().all(ChangeEvent::is_insert));
        assert_eq!(
            changes.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let failed = m.atomic(&mut || -> MapperResult<()> {
            m.delete(&parent)?;
            Err(MapperError::storage("abort"))
        });
        assert!(failed.is_err());
        assert_eq!(m.changes().len(), 3);
        assert_eq!(m.row_count(FOLDER), 1);
    }

    proptest::proptest! {
        #[test]
        fn failed_scope_leaves_no_trace(notes in 0usize..8, seeded in 0usize..4) {
            let m = mapper();
            for i in 0..seeded {
                m.insert(&folder(&format!("seed{i}")), None).unwrap();
            }
            let before = m.changes();

            let titles: Vec<String> = (0..notes).map(|i| format!("n{i}")).collect();
            let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
            let (parent, children) = folder_with_notes(&refs);
            let result = m.atomic(&mut || -> MapperResult<()> {
                m.insert(&parent, None)?;
                Err(MapperError::storage("abort"))
            });

            proptest::prop_assert!(result.is_err());
            proptest::prop_assert_eq!(m.row_count(FOLDER), seeded);
            proptest::prop_assert_eq!(m.row_count(NOTE), 0);
            proptest::prop_assert_eq!(m.changes(), before);
            proptest::prop_assert!(children.iter().all(|c| c.read().key().is_none()));

            let key = m.insert(&parent, None).unwrap();
            proptest::prop_assert_eq!(key, EntityKey::new(seeded as i64 + 1));
        }
    }

    #[test]
    fn nested_scope_joins_outer() {
        let m = mapper();
        let a = folder("a");
        let result = m.atomic(&mut || -> MapperResult<()> {
            m.atomic(&mut || m.insert(&a, None).map(|_| ()))?;
            Err(MapperError::storage("outer failure"))
        });

        assert!(result.is_err());
        assert_eq!(m.row_count(FOLDER), 0);
        assert_eq!(a.read().key(), None);
    }

    #[test]
    fn update_writes_changed_fields() {
        let m = mapper();
        let f = folder("draft");
        let key = m.insert(&f, None).unwrap();
        let baseline = f.read().snapshot();

        set_title(&f, "final");
        m.update(&f, &baseline).unwrap();

        let stored = m.row(FOLDER, key).unwrap().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::from("final")));
    }

    #[test]
    fn update_follows_reassigned_and_cleared_references() {
        let m = mapper();
        let (first, notes) = folder_with_notes(&["moving"]);
        let second = folder("archive");
        let first_key = m.insert(&first, None).unwrap();
        let second_key = m.insert(&second, None).unwrap();
        let n = &notes[0];
        let note_key = n.read().key().unwrap();

        let baseline = row::capture(&*n.read());
        assert_eq!(row::foreign_key(baseline.as_value(), "folder_id"), Some(first_key));
        uow_core::entity::with_mut::<Node, _>(n, |node| node.parent = Some(second.clone())).unwrap();
        m.update(n, &baseline).unwrap();
        let stored = m.row(NOTE, note_key).unwrap().unwrap();
        assert_eq!(row::foreign_key(&stored, "folder_id"), Some(second_key));

        let baseline = row::capture(&*n.read());
        uow_core::entity::with_mut::<Node, _>(n, |node| node.parent = None).unwrap();
        m.update(n, &baseline).unwrap();
        let stored = m.row(NOTE, note_key).unwrap().unwrap();
        assert_eq!(stored.get("folder_id"), Some(&Value::Null));
    }

    #[test]
    fn update_and_delete_need_a_stored_row() {
        let m = mapper();
        let unsaved = folder("x");
        assert!(matches!(
            m.update(&unsaved, &Snapshot::new(None)),
            Err(MapperError::MissingKey { .. })
        ));

        let f = folder("y");
        let key = m.insert(&f, None).unwrap();
        m.delete(&f).unwrap();
        assert!(matches!(
            m.delete(&f),
            Err(MapperError::NotFound { key: k, .. }) if k == key
        ));
    }

    #[test]
    fn fetch_restores_entity() {
        let m = mapper();
        m.put_row(
            FOLDER,
            EntityKey::new(7),
            &Value::map(vec![(Value::from("title"), Value::from("seeded"))]),
        )
        .unwrap();

        let f = m.fetch(&FOLDER_SCHEMA, EntityKey::new(7)).unwrap();
        assert_eq!(f.read().key(), Some(EntityKey::new(7)));
        assert_eq!(f.read().snapshot().text("title").unwrap(), "seeded");
        assert!(matches!(
            m.fetch(&FOLDER_SCHEMA, EntityKey::new(8)),
            Err(MapperError::NotFound { .. })
        ));

        let next = folder("next");
        assert_eq!(m.insert(&next, None).unwrap(), EntityKey::new(8));
    }

    #[test]
    fn locks_conflict_between_owners() {
        let m = mapper();
        let a = TransactionToken::new();
        let b = TransactionToken::new();
        let key = EntityKey::new(1);

        m.acquire_lock(FOLDER, key, a).unwrap();
        assert!(matches!(
            m.acquire_lock(FOLDER, key, b),
            Err(MapperError::LockConflict { holder, .. }) if holder == a
        ));
        m.release_lock(FOLDER, key, b).unwrap();
        assert_eq!(m.lock_holder(FOLDER, key), Some(a));
        m.release_lock(FOLDER, key, a).unwrap();
        assert_eq!(m.active_locks(), 0);
    }

    #[test]
    fn expired_lock_is_taken_over() {
        let m = MemoryMapper::with_config(
            SchemaRegistry::new().with(&FOLDER_SCHEMA),
            MapperConfig::new().lock_lease(Duration::from_millis(1)),
        );
        let key = EntityKey::new(1);
        m.acquire_lock(FOLDER, key, TransactionToken::new()).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let b = TransactionToken::new();
        m.acquire_lock(FOLDER, key, b).unwrap();
        assert_eq!(m.lock_holder(FOLDER, key), Some(b));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let m = MemoryMapper::new(SchemaRegistry::new());
        assert!(matches!(
            m.insert(&folder("x"), None),
            Err(MapperError::UnknownType { .. })
        ));
    }
}
