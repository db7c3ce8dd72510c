//! Value trees passed to and produced by the codec.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field name to value.
pub type ValueTree = BTreeMap<String, Value>;

/// A field value: an integer, an array, or a nested struct.
///
/// Deserializes straight from JSON: non-negative numbers become [Value::U64],
/// negative ones [Value::I64], arrays and objects map to [Value::Array] and
/// [Value::Struct]. Decoding always produces `U64`, `Array` and `Struct`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    U64(u64),
    /// Taken as two's complement when encoded.
    I64(i64),
    Array(Vec<Value>),
    Struct(ValueTree),
}

impl Value {
    /// Raw bits of an integer value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            Value::I64(v) => Some(*v as u64),
            _ => None,
        }
    }

    /// Elements of an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Fields of a nested struct value.
    pub fn as_struct(&self) -> Option<&ValueTree> {
        match self {
            Value::Struct(tree) => Some(tree),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U64(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<ValueTree> for Value {
    fn from(tree: ValueTree) -> Self {
        Value::Struct(tree)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}
