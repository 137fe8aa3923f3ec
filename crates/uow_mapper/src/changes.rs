//! Log of applied row changes.

use uow_core::{EntityKey, EntityType};

/// Type of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

/// One applied row change.
///
/// Changes made inside an atomic scope that fails are removed from the
/// log together with the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// Entity type of the row.
    pub entity_type: EntityType,
    /// Key of the row.
    pub key: EntityKey,
    /// Type of change.
    pub change_type: ChangeType,
}

impl ChangeEvent {
    /// Returns `true` for inserts.
    #[must_use]
    pub fn is_insert(&self) -> bool {
        self.change_type == ChangeType::Insert
    }
}
