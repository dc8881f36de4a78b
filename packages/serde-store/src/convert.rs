//! Conversions between Value and serde types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use storetree_core::{Error, Result, Value};

/// Convert a Value to a Rust type via serde.
///
/// Store references are read as their snapshots.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    let json = value_to_json(&value)?;
    serde_json::from_value(json).map_err(|e| Error::codec(e.to_string()))
}

/// Convert a Rust type to a Value via serde.
///
/// Goes through `serde_json`, which writes non-finite floats as null.
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    let json = serde_json::to_value(data).map_err(|e| Error::codec(e.to_string()))?;
    Ok(json_to_value(json))
}

/// Convert a Value to `serde_json::Value`.
///
/// Store references are emitted as nested snapshots. Non-finite floats have
/// no JSON form and are rejected.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    encode(value, "")
}

fn encode(value: &Value, location: &str) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::NonSerializablePayload {
                location: display_location(location),
                message: format!("non-finite float {}", f),
            })?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(arr) => serde_json::Value::Array(
            arr.iter()
                .enumerate()
                .map(|(i, v)| encode(v, &format!("{}/{}", location, i)))
                .collect::<Result<_>>()?,
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), encode(v, &format!("{}/{}", location, k))?)))
                .collect::<Result<_>>()?,
        ),
        Value::Store(store) => encode(&store.to_value(), location)?,
    })
}

fn display_location(location: &str) -> String {
    if location.is_empty() {
        "/".to_string()
    } else {
        location.to_string()
    }
}

/// Convert `serde_json::Value` to a Value.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        ),
    }
}
