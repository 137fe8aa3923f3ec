//! Dynamic payload value type.

use serde::{Deserialize, Serialize};

/// A dynamic payload value.
///
/// Snapshots and storage rows are `Value::Map`s keyed by field name.
/// Floats are not supported; monetary and numeric fields are stored as
/// integers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs, kept sorted by key.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with sorted keys.
    ///
    /// When a key appears more than once the last pair wins.
    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match out.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(pos) => out[pos].1 = value,
                Err(pos) => out.insert(pos, (key, value)),
            }
        }
        Value::Map(out)
    }

    /// Create an empty map.
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    /// Name of this value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a text key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Set a text key in this map value, keeping keys sorted.
    ///
    /// Returns the previous value for the key. Does nothing on non-maps.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        let Value::Map(pairs) = self else {
            return None;
        };
        let key = Value::Text(key.to_string());
        match pairs.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(pos) => Some(std::mem::replace(&mut pairs[pos].1, value)),
            Err(pos) => {
                pairs.insert(pos, (key, value));
                None
            }
        }
    }

    /// Remove a text key from this map value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let Value::Map(pairs) = self else {
            return None;
        };
        let pos = pairs.iter().position(|(k, _)| k.as_text() == Some(key))?;
        Some(pairs.remove(pos).1)
    }

    /// Iterates over the text-keyed fields of a map value.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.as_map()
            .unwrap_or(&[])
            .iter()
            .filter_map(|(k, v)| k.as_text().map(|name| (name, v)))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
