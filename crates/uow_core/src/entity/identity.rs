//! Tracked object identity.

use crate::types::{EntityKey, EntityType};
use std::fmt;

/// Identity under which a transaction tracks an object.
///
/// Objects without a persisted key are tracked by the arena slot the
/// tracker issued for them. Once the store assigns a key the entry is
/// re-keyed to the persisted identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Engine-issued slot for an object that has no key yet.
    Transient(u64),
    /// Declared type plus persisted key.
    Persisted {
        /// Entity type.
        entity_type: EntityType,
        /// Persisted key.
        key: EntityKey,
    },
}

impl Identity {
    /// Creates a persisted identity.
    #[must_use]
    pub const fn persisted(entity_type: EntityType, key: EntityKey) -> Self {
        Self::Persisted { entity_type, key }
    }

    /// Returns the persisted key, if any.
    #[must_use]
    pub const fn key(&self) -> Option<EntityKey> {
        match self {
            Self::Transient(_) => None,
            Self::Persisted { key, .. } => Some(*key),
        }
    }

    /// Returns `true` for transient identities.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(slot) => write!(f, "transient#{slot}"),
            Self::Persisted { entity_type, key } => write!(f, "{entity_type}#{key}"),
        }
    }
}
