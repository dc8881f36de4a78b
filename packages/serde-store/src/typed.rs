//! Typed access to stores through serde.

use serde::de::DeserializeOwned;
use serde::Serialize;

use storetree_core::{Result, StoreRef, Value};

use crate::convert::{from_value, to_value};

/// Extension trait for dispatching and reading with Rust types.
///
/// Implemented for [`StoreRef`].
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use storetree_core::{Outcome, Schema, StoreType};
/// use storetree_serde::{from_value, TypedDispatch};
///
/// #[derive(Serialize, Deserialize)]
/// struct Move {
///     x: i64,
///     y: i64,
/// }
///
/// let schema = Schema::builder()
///     .store(
///         StoreType::builder("Cursor")
///             .number("x", 0)
///             .number("y", 0)
///             .action("move", |ctx, args| {
///                 let m: Move = from_value(args[0].clone())?;
///                 ctx.store().set("x", m.x)?;
///                 ctx.store().set("y", m.y)?;
///                 Ok(Outcome::done())
///             }),
///     )
///     .build()
///     .unwrap();
///
/// let cursor = schema.instance("Cursor").unwrap();
/// cursor.dispatch_typed("move", &Move { x: 3, y: 4 }).unwrap();
/// let y: i64 = cursor.get_as("y").unwrap();
/// assert_eq!(y, 4);
/// ```
pub trait TypedDispatch {
    /// Dispatch `action` with `payload` serialized as its single argument.
    fn dispatch_typed<T: Serialize + ?Sized>(&self, action: &str, payload: &T) -> Result<Option<Value>>;

    /// Dispatch `action` and deserialize the handler's return value.
    ///
    /// Returns `None` if a middleware aborted the dispatch.
    fn dispatch_returning<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        action: &str,
        payload: &T,
    ) -> Result<Option<R>>;

    /// Read a field into a Rust type. Reference fields read as snapshots.
    fn get_as<R: DeserializeOwned>(&self, field: &str) -> Result<R>;

    /// Write a serialized Rust value to a field, through the write gate.
    fn set_typed<T: Serialize + ?Sized>(&self, field: &str, value: &T) -> Result<()>;

    /// The whole subtree snapshot as a Rust type.
    fn snapshot_as<R: DeserializeOwned>(&self) -> Result<R>;
}

impl TypedDispatch for StoreRef {
    fn dispatch_typed<T: Serialize + ?Sized>(&self, action: &str, payload: &T) -> Result<Option<Value>> {
        self.dispatch(action, vec![to_value(payload)?])
    }

    fn dispatch_returning<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        action: &str,
        payload: &T,
    ) -> Result<Option<R>> {
        self.dispatch_typed(action, payload)?
            .map(from_value)
            .transpose()
    }

    fn get_as<R: DeserializeOwned>(&self, field: &str) -> Result<R> {
        from_value(self.get(field)?)
    }

    fn set_typed<T: Serialize + ?Sized>(&self, field: &str, value: &T) -> Result<()> {
        self.set(field, to_value(value)?)
    }

    fn snapshot_as<R: DeserializeOwned>(&self) -> Result<R> {
        from_value(self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;
    use storetree_core::{Outcome, Schema, StoreType};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        theme: String,
        font_size: i64,
    }

    fn store() -> StoreRef {
        Schema::builder()
            .store(
                StoreType::builder("Prefs")
                    .mutable()
                    .scalar("settings", Value::map())
                    .number("version", 1)
                    .action("bump", |ctx, args| {
                        let by = args[0].as_i64().unwrap_or(1);
                        let version = ctx.store().get("version")?.as_i64().unwrap_or(0) + by;
                        ctx.store().set("version", version)?;
                        Ok(Outcome::value(version))
                    }),
            )
            .build()
            .unwrap()
            .instance("Prefs")
            .unwrap()
    }

    #[test]
    fn typed_field_roundtrip() {
        let prefs = store();
        let settings = Settings {
            theme: "dark".to_string(),
            font_size: 14,
        };
        prefs.set_typed("settings", &settings).unwrap();
        assert_eq!(prefs.get_as::<Settings>("settings").unwrap(), settings);
    }

    #[test]
    fn dispatch_returning_decodes_result() {
        let prefs = store();
        let version: Option<u32> = prefs.dispatch_returning("bump", &2).unwrap();
        assert_eq!(version, Some(3));
    }

    #[test]
    fn snapshot_as_map() {
        let prefs = store();
        let snapshot: BTreeMap<String, serde_json::Value> = prefs.snapshot_as().unwrap();
        assert_eq!(snapshot["version"], serde_json::json!(1));
    }
}
