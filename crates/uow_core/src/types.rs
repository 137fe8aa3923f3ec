//! Core type definitions for the UOW engine.

use std::fmt;
use uuid::Uuid;

/// Unique token identifying a transaction.
///
/// Tokens are random v4 UUIDs. They key the transaction registry and are
/// recorded as the owner of pessimistic locks and version markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionToken(Uuid);

impl TransactionToken {
    /// Creates a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a token from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Persisted identity key of an entity, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub i64);

impl EntityKey {
    /// Creates a new entity key.
    #[must_use]
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared type of an entity.
///
/// Entity types are named by their schema and compared by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityType(&'static str);

impl EntityType {
    /// Creates an entity type from its name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        assert_ne!(TransactionToken::new(), TransactionToken::new());
    }

    #[test]
    fn token_display_is_prefixed() {
        let token = TransactionToken::from_uuid(Uuid::nil());
        assert_eq!(
            token.to_string(),
            "txn:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn entity_key_ordering() {
        assert!(EntityKey::new(1) < EntityKey::new(2));
        assert_eq!(EntityKey::new(7).as_i64(), 7);
    }

    #[test]
    fn entity_type_compares_by_name() {
        assert_eq!(EntityType::new("Product"), EntityType::new("Product"));
        assert_eq!(format!("{}", EntityType::new("Order")), "Order");
    }
}
