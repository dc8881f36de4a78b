//! The Value type - the domain of field values and action payloads.
//!
//! Scalars and plain aggregates map directly onto JSON-like data. The extra
//! [`Value::Store`] variant carries a live store reference so payloads can
//! move sub-stores around the tree; [`Value::to_plain`] replaces those
//! references with their snapshots.

use std::collections::BTreeMap;

use crate::store::StoreRef;
use crate::Error;

/// A tree-shaped value held by scalar fields or passed as an action argument.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering (snapshots compare stably)
/// - Uses `i64` for integers and `f64` for floats
/// - Non-finite floats can be held but are not serializable payloads
/// - Every variant except `Store` maps onto JSON without loss, so there is
///   no binary variant
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value map with string keys.
    Map(BTreeMap<String, Value>),
    /// Reference to a live store instance.
    Store(StoreRef),
}

impl Value {
    /// Create an empty map.
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<&StoreRef> {
        match self {
            Value::Store(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Store(_) => "store",
        }
    }

    /// Truthiness used by boolean coercion.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) | Value::Store(_) => true,
        }
    }

    /// Verify that this value can travel as an action payload.
    ///
    /// `location` prefixes the error location, e.g. `"args/0"`.
    pub fn check_serializable(&self, location: &str) -> Result<(), Error> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(Error::NonSerializablePayload {
                location: location.to_string(),
                message: format!("non-finite float {}", f),
            }),
            Value::Array(arr) => arr
                .iter()
                .enumerate()
                .try_for_each(|(i, v)| v.check_serializable(&format!("{}/{}", location, i))),
            Value::Map(map) => map
                .iter()
                .try_for_each(|(k, v)| v.check_serializable(&format!("{}/{}", location, k))),
            _ => Ok(()),
        }
    }

    /// Replace every store reference by its snapshot.
    pub fn to_plain(&self) -> Value {
        match self {
            Value::Store(store) => store.to_value(),
            Value::Array(arr) => Value::Array(arr.iter().map(Value::to_plain).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_plain()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<StoreRef> for Value {
    fn from(v: StoreRef) -> Self {
        Value::Store(v)
    }
}

impl From<&StoreRef> for Value {
    fn from(v: &StoreRef) -> Self {
        Value::Store(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
