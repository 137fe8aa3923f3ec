//! Full-state entity snapshots.

use crate::types::EntityKey;
use uow_codec::{CodecError, CodecResult, Value};

/// Immutable value copy of an entity's full state.
///
/// A snapshot is a map of field name to [`Value`]. The persisted key is
/// kept under [`Snapshot::KEY_FIELD`] (`Null` while unsaved). Because the
/// snapshot owns its values, later mutation of the live entity never
/// changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    fields: Value,
}

impl Snapshot {
    /// Field holding the persisted key.
    pub const KEY_FIELD: &'static str = "id";

    /// Starts a snapshot carrying only the key.
    #[must_use]
    pub fn new(key: Option<EntityKey>) -> Self {
        let mut fields = Value::empty_map();
        fields.insert(Self::KEY_FIELD, Value::from(key.map(EntityKey::as_i64)));
        Self { fields }
    }

    /// Adds or replaces a field.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name, value.into());
        self
    }

    /// Wraps a map value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a map.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        if value.as_map().is_none() {
            return Err(CodecError::unexpected_type("map", value.kind()));
        }
        Ok(Self { fields: value })
    }

    /// The persisted key recorded in this snapshot.
    #[must_use]
    pub fn key(&self) -> Option<EntityKey> {
        self.fields
            .get(Self::KEY_FIELD)
            .and_then(Value::as_integer)
            .map(EntityKey::new)
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Reads an integer field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is absent or not an integer.
    pub fn integer(&self, name: &str) -> CodecResult<i64> {
        let value = self.require(name)?;
        value
            .as_integer()
            .ok_or_else(|| CodecError::unexpected_type("integer", value.kind()))
    }

    /// Reads a text field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is absent or not text.
    pub fn text(&self, name: &str) -> CodecResult<&str> {
        let value = self.require(name)?;
        value
            .as_text()
            .ok_or_else(|| CodecError::unexpected_type("text", value.kind()))
    }

    /// Reads a boolean field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is absent or not a boolean.
    pub fn boolean(&self, name: &str) -> CodecResult<bool> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| CodecError::unexpected_type("bool", value.kind()))
    }

    fn require(&self, name: &str) -> CodecResult<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| CodecError::decoding_failed(format!("missing field `{name}`")))
    }

    /// Names of fields whose value differs from `baseline`.
    ///
    /// Fields present only in `baseline` are reported as well.
    #[must_use]
    pub fn changed_fields<'a>(&'a self, baseline: &'a Snapshot) -> Vec<&'a str> {
        let mut changed: Vec<&str> = self
            .fields
            .fields()
            .filter(|(name, value)| baseline.get(name) != Some(*value))
            .map(|(name, _)| name)
            .collect();
        changed.extend(
            baseline
                .fields
                .fields()
                .filter(|(name, _)| self.get(name).is_none())
                .map(|(name, _)| name),
        );
        changed
    }

    /// The snapshot as a map value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.fields
    }

    /// Consumes the snapshot into its map value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.fields
    }
}
