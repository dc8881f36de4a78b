//! Serde integration for store trees.
//!
//! This layer adds:
//! - Value <-> serde conversions (`to_value`, `from_value`)
//! - `TypedDispatch`: dispatch and read with Rust types
//! - Full-tree JSON snapshots (`to_json`) and restore (`restore_json`),
//!   the latter dispatched as `@@INIT`
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use storetree_core::{Schema, StoreType};
//! use storetree_serde::{create_from_json, to_json};
//!
//! let schema = Schema::builder()
//!     .store(StoreType::builder("List").children("items", "Item"))
//!     .store(StoreType::builder("Item").scalar("label", ""))
//!     .build()
//!     .unwrap();
//!
//! let state = json!({"items": [{"label": "a"}, {"label": "b"}]});
//! let list = create_from_json(&schema, "List", &state).unwrap();
//! assert_eq!(to_json(&list).unwrap(), state);
//! ```

mod convert;
mod json;
mod typed;

pub use convert::{from_value, json_to_value, to_value, value_to_json};
pub use json::{
    create_from_json, restore_json, restore_json_str, to_json, to_json_string,
    to_json_string_pretty,
};
pub use typed::TypedDispatch;

// Re-export core types for convenience
pub use storetree_core::{Error, Result, StoreRef, Value};
