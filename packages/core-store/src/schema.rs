//! Field Descriptor Registry and Action Registry.
//!
//! Store types are declared once with [`StoreType::builder`] and collected
//! into a [`Schema`]. Reference fields name their child type, so a type may
//! hold children of its own type; [`SchemaBuilder::build`] checks that every
//! referenced type exists.
//!
//! # Example
//!
//! ```rust
//! use storetree_core::{Outcome, Schema, StoreType, Value};
//!
//! let schema = Schema::builder()
//!     .store(
//!         StoreType::builder("Counter")
//!             .number("count", 0)
//!             .action("increment", |ctx, _args| {
//!                 let count = ctx.store().get("count")?.as_i64().unwrap_or(0);
//!                 ctx.store().set("count", count + 1)?;
//!                 Ok(Outcome::done())
//!             }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let counter = schema.instance("Counter").unwrap();
//! counter.dispatch("increment", vec![]).unwrap();
//! assert_eq!(counter.get("count").unwrap(), Value::from(1i64));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dispatch::{ActionContext, Outcome};
use crate::path::is_identifier;
use crate::store::{StoreBuilder, StoreRef};
use crate::{Error, Result, Value};

/// Coercion applied to a scalar field before a write is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    #[default]
    Identity,
    Number,
    Boolean,
}

impl Coercion {
    pub fn apply(&self, field: &str, value: Value) -> Result<Value> {
        match self {
            Coercion::Identity => Ok(value),
            Coercion::Boolean => Ok(Value::Bool(value.is_truthy())),
            Coercion::Number => to_number(field, value),
        }
    }
}

fn to_number(field: &str, value: Value) -> Result<Value> {
    let failed = |message: String| Error::Coercion {
        field: field.to_string(),
        target: "number".to_string(),
        message,
    };
    match value {
        Value::Integer(_) => Ok(value),
        Value::Float(f) if f.is_finite() => Ok(value),
        Value::Float(f) => Err(failed(format!("{} is not a finite number", f))),
        Value::Null => Ok(Value::Integer(0)),
        Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Value::Integer(0));
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Float(f)),
                _ => Err(failed(format!("'{}' is not a number", s))),
            }
        }
        other => Err(failed(format!("cannot convert {}", other.type_name()))),
    }
}

/// Serialization kind of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value, coerced on write.
    Scalar(Coercion),
    /// Optional single child store of the named type.
    Ref(String),
    /// Ordered children of the named type.
    RefArray(String),
    /// Keyed children of the named type.
    RefMap(String),
}

impl FieldKind {
    /// Child store type for reference kinds.
    pub fn child_type(&self) -> Option<&str> {
        match self {
            FieldKind::Scalar(_) => None,
            FieldKind::Ref(t) | FieldKind::RefArray(t) | FieldKind::RefMap(t) => Some(t),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            FieldKind::Scalar(_) => "scalar".to_string(),
            FieldKind::Ref(t) => format!("reference to {}", t),
            FieldKind::RefArray(t) => format!("array of {}", t),
            FieldKind::RefMap(t) => format!("map of {}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Initial value for scalar fields; reference fields start empty.
    pub default: Value,
}

/// Whether direct writes to a store are turned into actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Mutable,
    Immutable,
    /// Follow the parent; a root that inherits is immutable.
    #[default]
    Inherit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    Sync,
    Async,
}

/// Action handler. Receives the executing store and the payload.
pub type Handler = Rc<dyn Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome>>;

/// Registration of one named action.
#[derive(Clone)]
pub struct ActionSpec {
    pub mode: ActionMode,
    /// Whether the action is broadcast to descendants after this handler.
    pub propagate: bool,
    pub handler: Handler,
}

impl ActionSpec {
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome> + 'static,
    {
        Self {
            mode: ActionMode::Sync,
            propagate: true,
            handler: Rc::new(handler),
        }
    }

    pub fn asynchronous<F>(handler: F) -> Self
    where
        F: Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome> + 'static,
    {
        Self {
            mode: ActionMode::Async,
            propagate: true,
            handler: Rc::new(handler),
        }
    }

    #[must_use]
    pub fn no_propagate(mut self) -> Self {
        self.propagate = false;
        self
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("mode", &self.mode)
            .field("propagate", &self.propagate)
            .finish_non_exhaustive()
    }
}

/// Schema of one kind of store: fields, mutability and actions.
#[derive(Debug)]
pub struct StoreType {
    name: String,
    fields: Vec<FieldDescriptor>,
    mutability: Mutability,
    actions: BTreeMap<String, ActionSpec>,
}

impl StoreType {
    pub fn builder(name: impl Into<String>) -> StoreTypeBuilder {
        StoreTypeBuilder {
            name: name.into(),
            fields: Vec::new(),
            mutability: Mutability::Inherit,
            actions: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub(crate) fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            store_type: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// Declarative description of a [`StoreType`].
pub struct StoreTypeBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    mutability: Mutability,
    actions: BTreeMap<String, ActionSpec>,
    errors: Vec<String>,
}

impl StoreTypeBuilder {
    #[must_use]
    pub fn mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    #[must_use]
    pub fn mutable(self) -> Self {
        self.mutability(Mutability::Mutable)
    }

    #[must_use]
    pub fn immutable(self) -> Self {
        self.mutability(Mutability::Immutable)
    }

    /// Declare a field of any kind.
    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind, default: impl Into<Value>) -> Self {
        if !is_identifier(name) {
            self.errors
                .push(format!("field name '{}' is not an identifier", name));
        } else if self.fields.iter().any(|f| f.name == name) {
            self.errors.push(format!("field '{}' declared twice", name));
        }
        let default = match &kind {
            FieldKind::Scalar(coercion) => {
                let checked = coercion
                    .apply(name, default.into())
                    .and_then(|value| value.check_serializable(name).map(|()| value.to_plain()));
                checked.unwrap_or_else(|e| {
                    self.errors.push(format!("default of '{}': {}", name, e));
                    Value::Null
                })
            }
            _ => Value::Null,
        };
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind,
            default,
        });
        self
    }

    /// Scalar field stored as given.
    #[must_use]
    pub fn scalar(self, name: &str, default: impl Into<Value>) -> Self {
        self.field(name, FieldKind::Scalar(Coercion::Identity), default)
    }

    /// Scalar field coerced to a number.
    #[must_use]
    pub fn number(self, name: &str, default: impl Into<Value>) -> Self {
        self.field(name, FieldKind::Scalar(Coercion::Number), default)
    }

    /// Scalar field coerced to a boolean.
    #[must_use]
    pub fn boolean(self, name: &str, default: bool) -> Self {
        self.field(name, FieldKind::Scalar(Coercion::Boolean), default)
    }

    /// Optional child store of type `store_type`.
    #[must_use]
    pub fn child(self, name: &str, store_type: &str) -> Self {
        self.field(name, FieldKind::Ref(store_type.to_string()), Value::Null)
    }

    /// Ordered children of type `store_type`.
    #[must_use]
    pub fn children(self, name: &str, store_type: &str) -> Self {
        self.field(name, FieldKind::RefArray(store_type.to_string()), Value::Null)
    }

    /// Keyed children of type `store_type`.
    #[must_use]
    pub fn child_map(self, name: &str, store_type: &str) -> Self {
        self.field(name, FieldKind::RefMap(store_type.to_string()), Value::Null)
    }

    /// Synchronous action that propagates to descendants.
    #[must_use]
    pub fn action<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome> + 'static,
    {
        self.action_spec(name, ActionSpec::sync(handler))
    }

    /// Asynchronous action that propagates to descendants.
    #[must_use]
    pub fn async_action<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome> + 'static,
    {
        self.action_spec(name, ActionSpec::asynchronous(handler))
    }

    #[must_use]
    pub fn action_spec(mut self, name: &str, spec: ActionSpec) -> Self {
        if name.is_empty() || name.starts_with('@') || name.contains('/') {
            self.errors.push(format!(
                "action name '{}' is empty, reserved or contains '/'",
                name
            ));
        }
        self.actions.insert(name.to_string(), spec);
        self
    }

    pub fn build(self) -> Result<StoreType> {
        if !self.errors.is_empty() {
            return Err(Error::schema(format!(
                "store type {}: {}",
                self.name,
                self.errors.join("; ")
            )));
        }
        Ok(StoreType {
            name: self.name,
            fields: self.fields,
            mutability: self.mutability,
            actions: self.actions,
        })
    }
}

/// Registry of every store type of an application.
#[derive(Debug)]
pub struct Schema {
    types: BTreeMap<String, Rc<StoreType>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            types: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn store_type(&self, name: &str) -> Result<Rc<StoreType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownStoreType(name.to_string()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Start constructing a store instance of type `name`.
    pub fn create(self: &Rc<Self>, name: &str) -> StoreBuilder {
        StoreBuilder::new(self.clone(), name)
    }

    /// Construct a store instance with default field values.
    pub fn instance(self: &Rc<Self>, name: &str) -> Result<StoreRef> {
        self.create(name).build()
    }
}

pub struct SchemaBuilder {
    types: Vec<StoreType>,
    errors: Vec<Error>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn store(mut self, builder: StoreTypeBuilder) -> Self {
        match builder.build() {
            Ok(store_type) => self.types.push(store_type),
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn build(mut self) -> Result<Rc<Schema>> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        let mut types = BTreeMap::new();
        for store_type in self.types {
            let name = store_type.name.clone();
            if types.insert(name.clone(), Rc::new(store_type)).is_some() {
                return Err(Error::schema(format!("store type {} declared twice", name)));
            }
        }

        for store_type in types.values() {
            for field in &store_type.fields {
                if let Some(child) = field.kind.child_type() {
                    if !types.contains_key(child) {
                        return Err(Error::schema(format!(
                            "field {}.{} references unknown store type {}",
                            store_type.name, field.name, child
                        )));
                    }
                }
            }
        }

        Ok(Rc::new(Schema { types }))
    }
}
