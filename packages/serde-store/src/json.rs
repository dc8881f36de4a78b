//! Full-tree JSON snapshots.
//!
//! A snapshot is the plain nested structure of a store's fields: scalars as
//! they are, references as nested objects, reference arrays and maps as JSON
//! arrays and objects. Parent links are never part of it. Restoring goes
//! through the reserved `@@INIT` action so middleware sees it like any other
//! dispatch.

use std::rc::Rc;

use storetree_core::{Error, Result, Schema, StoreRef, Value};

use crate::convert::{json_to_value, value_to_json};

/// Snapshot of the subtree rooted at `store`.
pub fn to_json(store: &StoreRef) -> Result<serde_json::Value> {
    value_to_json(&store.to_value())
}

/// Snapshot of the subtree rooted at `store`, as JSON text.
pub fn to_json_string(store: &StoreRef) -> Result<String> {
    serde_json::to_string(&to_json(store)?).map_err(|e| Error::codec(e.to_string()))
}

/// Pretty-printed variant of [`to_json_string`].
pub fn to_json_string_pretty(store: &StoreRef) -> Result<String> {
    serde_json::to_string_pretty(&to_json(store)?).map_err(|e| Error::codec(e.to_string()))
}

/// Replace the state of `store` with `json` through an `@@INIT` dispatch.
///
/// Children are rebuilt from the snapshot and attached; existing children
/// in replaced fields are detached. Returns `None` if a middleware aborted
/// the restore.
pub fn restore_json(store: &StoreRef, json: &serde_json::Value) -> Result<Option<Value>> {
    store.restore(json_to_value(json.clone()))
}

/// [`restore_json`] from JSON text.
pub fn restore_json_str(store: &StoreRef, text: &str) -> Result<Option<Value>> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::codec(e.to_string()))?;
    restore_json(store, &json)
}

/// Create a root store of `type_name` initialised from `json`.
pub fn create_from_json(
    schema: &Rc<Schema>,
    type_name: &str,
    json: &serde_json::Value,
) -> Result<StoreRef> {
    schema
        .create(type_name)
        .initial(json_to_value(json.clone()))
        .build()
}
