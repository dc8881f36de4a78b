//! Store instances.
//!
//! A [`StoreRef`] is a cheap, clonable handle to one live store. Ownership
//! flows from parent to child through field slots; the parent link kept by
//! each child is weak. All field writes go through [`StoreRef::set`] or the
//! collection adapters, which enforce the write gate.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;
use uuid::Uuid;

use crate::dispatch::Engine;
use crate::middleware::Middleware;
use crate::mutable::{WriteOp, INIT_ACTION};
use crate::observe::Observers;
use crate::scheduler::Scheduler;
use crate::schema::{FieldKind, Mutability, Schema, StoreType};
use crate::tree::ParentLink;
use crate::{Error, Result, Value};

/// Unique identifier of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(Uuid);

impl StoreId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current content of one field.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Scalar(Value),
    Ref(Option<StoreRef>),
    List(Vec<StoreRef>),
    Map(BTreeMap<String, StoreRef>),
}

impl Slot {
    fn empty(kind: &FieldKind, default: &Value) -> Self {
        match kind {
            FieldKind::Scalar(_) => Slot::Scalar(default.clone()),
            FieldKind::Ref(_) => Slot::Ref(None),
            FieldKind::RefArray(_) => Slot::List(Vec::new()),
            FieldKind::RefMap(_) => Slot::Map(BTreeMap::new()),
        }
    }

    pub(crate) fn stores(&self) -> Vec<StoreRef> {
        match self {
            Slot::Scalar(_) => Vec::new(),
            Slot::Ref(child) => child.iter().cloned().collect(),
            Slot::List(items) => items.clone(),
            Slot::Map(items) => items.values().cloned().collect(),
        }
    }
}

pub(crate) struct StoreNode {
    id: StoreId,
    store_type: Rc<StoreType>,
    schema: Rc<Schema>,
    pub(crate) parent: RefCell<Option<ParentLink>>,
    pub(crate) slots: RefCell<BTreeMap<String, Slot>>,
    pub(crate) engine: Engine,
    pub(crate) observers: Observers,
}

/// Handle to a live store instance.
///
/// Equality is identity: two handles are equal when they point at the same
/// instance.
#[derive(Clone)]
pub struct StoreRef(pub(crate) Rc<StoreNode>);

impl StoreRef {
    /// Create a detached store with default field values.
    ///
    /// No action is dispatched; callers that need the construction to be
    /// visible to middleware use [`StoreBuilder`].
    pub(crate) fn new_detached(schema: Rc<Schema>, store_type: Rc<StoreType>) -> Self {
        let slots = store_type
            .fields()
            .iter()
            .map(|f| (f.name.clone(), Slot::empty(&f.kind, &f.default)))
            .collect();
        StoreRef(Rc::new(StoreNode {
            id: StoreId::new(),
            store_type,
            schema,
            parent: RefCell::new(None),
            slots: RefCell::new(slots),
            engine: Engine::default(),
            observers: Observers::default(),
        }))
    }

    /// Create a detached store of type `type_name` populated from `snapshot`.
    pub(crate) fn instantiate(schema: &Rc<Schema>, type_name: &str, snapshot: &Value) -> Result<Self> {
        let store_type = schema.store_type(type_name)?;
        let store = StoreRef::new_detached(schema.clone(), store_type);
        store.hydrate(snapshot)?;
        Ok(store)
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.0.engine
    }

    pub fn id(&self) -> StoreId {
        self.0.id
    }

    pub fn store_type(&self) -> &Rc<StoreType> {
        &self.0.store_type
    }

    pub fn type_name(&self) -> &str {
        self.0.store_type.name()
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.0.schema
    }

    pub fn ptr_eq(&self, other: &StoreRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Effective mutability: the type's own flag, or the parent's when the
    /// type inherits. Roots that inherit are immutable.
    pub fn is_mutable(&self) -> bool {
        match self.0.store_type.mutability() {
            Mutability::Mutable => true,
            Mutability::Immutable => false,
            Mutability::Inherit => self.parent().is_some_and(|p| p.is_mutable()),
        }
    }

    /// Read a field.
    ///
    /// Reference fields read as [`Value::Store`], arrays of them as
    /// [`Value::Array`] and maps as [`Value::Map`]; an empty reference reads
    /// as [`Value::Null`].
    pub fn get(&self, field: &str) -> Result<Value> {
        self.0.store_type.require_field(field)?;
        let slots = self.0.slots.borrow();
        let value = match slots.get(field) {
            Some(Slot::Scalar(v)) => v.clone(),
            Some(Slot::Ref(child)) => child.clone().map_or(Value::Null, Value::Store),
            Some(Slot::List(items)) => {
                Value::Array(items.iter().cloned().map(Value::Store).collect())
            }
            Some(Slot::Map(items)) => Value::Map(
                items
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Store(v.clone())))
                    .collect(),
            ),
            None => Value::Null,
        };
        Ok(value)
    }

    /// The child held by a single-reference field.
    pub fn child(&self, field: &str) -> Result<Option<StoreRef>> {
        match self.slot(field)? {
            Slot::Ref(child) => Ok(child),
            _ => Err(self.kind_mismatch(field, "reference")),
        }
    }

    /// Write a field.
    ///
    /// Inside an executing action the write is applied directly. Outside of
    /// one, a mutable store turns the write into an `@field` action and an
    /// immutable store rejects it with [`Error::IllegalMutation`].
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.mutate(WriteOp::assign(field), vec![value.into()])
            .map(|_| ())
    }

    /// Replace the state with `snapshot` through an `@@INIT` action.
    ///
    /// Child stores are rebuilt from the snapshot, never mutated in place.
    pub fn restore(&self, snapshot: Value) -> Result<Option<Value>> {
        self.dispatch(INIT_ACTION, vec![snapshot])
    }

    /// Snapshot of the whole subtree rooted here.
    ///
    /// Parent links are not part of the snapshot.
    pub fn to_value(&self) -> Value {
        let slots = self.0.slots.borrow();
        let map = slots
            .iter()
            .map(|(name, slot)| {
                let value = match slot {
                    Slot::Scalar(v) => v.to_plain(),
                    Slot::Ref(child) => child.as_ref().map_or(Value::Null, StoreRef::to_value),
                    Slot::List(items) => Value::Array(items.iter().map(StoreRef::to_value).collect()),
                    Slot::Map(items) => Value::Map(
                        items
                            .iter()
                            .map(|(k, v)| (k.clone(), v.to_value()))
                            .collect(),
                    ),
                };
                (name.clone(), value)
            })
            .collect();
        Value::Map(map)
    }

    pub(crate) fn slot(&self, field: &str) -> Result<Slot> {
        self.0.store_type.require_field(field)?;
        self.0
            .slots
            .borrow()
            .get(field)
            .cloned()
            .ok_or_else(|| Error::UnknownField {
                store_type: self.type_name().to_string(),
                field: field.to_string(),
            })
    }

    pub(crate) fn kind_mismatch(&self, field: &str, expected: &str) -> Error {
        let found = self
            .0
            .store_type
            .field(field)
            .map_or_else(|| "nothing".to_string(), |f| f.kind.describe());
        Error::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found,
        }
    }

    /// Apply `snapshot` field by field, ignoring unknown keys.
    pub(crate) fn hydrate(&self, snapshot: &Value) -> Result<()> {
        let map = match snapshot {
            Value::Null => return Ok(()),
            Value::Map(map) => map,
            other => {
                return Err(Error::TypeMismatch {
                    field: self.type_name().to_string(),
                    expected: "map snapshot".to_string(),
                    found: other.type_name().to_string(),
                })
            }
        };
        for (key, value) in map {
            if self.0.store_type.field(key).is_none() {
                warn!(store = %self, field = %key, "ignoring unknown field in snapshot");
                continue;
            }
            self.write_field(key, value.clone())?;
        }
        Ok(())
    }

    /// Turn a payload value into a store of type `type_name`: live references
    /// are used as is, map snapshots are instantiated.
    pub(crate) fn element_from_value(
        &self,
        field: &str,
        type_name: &str,
        value: Value,
    ) -> Result<StoreRef> {
        match value {
            Value::Store(store) if store.type_name() == type_name => Ok(store),
            Value::Store(store) => Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: type_name.to_string(),
                found: store.type_name().to_string(),
            }),
            snapshot @ Value::Map(_) => StoreRef::instantiate(&self.0.schema, type_name, &snapshot),
            other => Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: type_name.to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Commit a field write without consulting the write gate.
    pub(crate) fn write_field(&self, field: &str, value: Value) -> Result<Value> {
        let descriptor = self.0.store_type.require_field(field)?.clone();
        let slot = match &descriptor.kind {
            FieldKind::Scalar(coercion) => {
                if contains_store(&value) {
                    return Err(Error::TypeMismatch {
                        field: field.to_string(),
                        expected: "plain value".to_string(),
                        found: "store reference".to_string(),
                    });
                }
                let value = coercion.apply(field, value)?;
                value.check_serializable(field)?;
                Slot::Scalar(value)
            }
            FieldKind::Ref(type_name) => {
                let child = match value {
                    Value::Null => None,
                    other => Some(self.element_from_value(field, type_name, other)?),
                };
                Slot::Ref(child)
            }
            FieldKind::RefArray(type_name) => {
                let items = match value {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items
                        .into_iter()
                        .map(|v| self.element_from_value(field, type_name, v))
                        .collect::<Result<Vec<_>>>()?,
                    other => {
                        return Err(Error::TypeMismatch {
                            field: field.to_string(),
                            expected: "array".to_string(),
                            found: other.type_name().to_string(),
                        })
                    }
                };
                Slot::List(items)
            }
            FieldKind::RefMap(type_name) => {
                let items = match value {
                    Value::Null => BTreeMap::new(),
                    Value::Map(items) => {
                        let mut out = BTreeMap::new();
                        for (key, v) in items {
                            crate::Path::try_from_components(vec![key.clone()])?;
                            out.insert(key, self.element_from_value(field, type_name, v)?);
                        }
                        out
                    }
                    other => {
                        return Err(Error::TypeMismatch {
                            field: field.to_string(),
                            expected: "map".to_string(),
                            found: other.type_name().to_string(),
                        })
                    }
                };
                Slot::Map(items)
            }
        };

        self.replace_slot(field, slot)?;
        self.notify(field);
        Ok(Value::Null)
    }

    /// Swap a slot, keeping parent links consistent: every incoming child is
    /// validated before any link changes.
    pub(crate) fn replace_slot(&self, field: &str, slot: Slot) -> Result<()> {
        let incoming = slot.stores();
        for (i, child) in incoming.iter().enumerate() {
            if incoming[..i].iter().any(|c| c.ptr_eq(child)) {
                return Err(Error::AlreadyOwned {
                    child: child.to_string(),
                    field: field.to_string(),
                });
            }
            self.check_attach(field, child)?;
        }

        let outgoing = self
            .0
            .slots
            .borrow_mut()
            .insert(field.to_string(), slot)
            .map(|old| old.stores())
            .unwrap_or_default();

        for old in outgoing {
            if !incoming.iter().any(|c| c.ptr_eq(&old)) {
                old.unlink();
            }
        }
        for child in &incoming {
            self.link(field, child);
        }
        Ok(())
    }
}

fn contains_store(value: &Value) -> bool {
    match value {
        Value::Store(_) => true,
        Value::Array(items) => items.iter().any(contains_store),
        Value::Map(items) => items.values().any(contains_store),
        _ => false,
    }
}

impl PartialEq for StoreRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRef")
            .field("type", &self.type_name())
            .field("id", &self.0.id)
            .finish()
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.id.to_string();
        write!(f, "{}#{}", self.type_name(), &id[..8])
    }
}

/// Construction options for a store instance; see [`Schema::create`].
pub struct StoreBuilder {
    schema: Rc<Schema>,
    type_name: String,
    initial: Option<Value>,
    middleware: Vec<Rc<dyn Middleware>>,
    scheduler: Option<Rc<Scheduler>>,
}

impl StoreBuilder {
    pub(crate) fn new(schema: Rc<Schema>, type_name: &str) -> Self {
        Self {
            schema,
            type_name: type_name.to_string(),
            initial: None,
            middleware: Vec::new(),
            scheduler: None,
        }
    }

    /// Initial state, applied through an `@@INIT` action.
    #[must_use]
    pub fn initial(mut self, state: impl Into<Value>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Append a root middleware. Only meaningful for stores used as roots.
    #[must_use]
    pub fn middleware(mut self, middleware: Rc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Scheduler used by asynchronous handlers and thunks of this root.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Rc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Result<StoreRef> {
        let store_type = self.schema.store_type(&self.type_name)?;
        let store = StoreRef::new_detached(self.schema, store_type);
        store.engine().install_middleware(self.middleware);
        if let Some(scheduler) = self.scheduler {
            store.engine().set_scheduler(scheduler);
        }
        if let Some(initial) = self.initial {
            store.dispatch(INIT_ACTION, vec![initial])?;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Outcome, StoreType};
    use std::collections::BTreeMap;

    fn schema() -> Rc<Schema> {
        Schema::builder()
            .store(
                StoreType::builder("User")
                    .scalar("name", "anonymous")
                    .number("age", 0)
                    .child("address", "Address")
                    .action("rename", |ctx, args| {
                        ctx.store().set("name", args[0].clone())?;
                        Ok(Outcome::done())
                    })
                    .action("corrupt", |ctx, _| {
                        let mut nested = BTreeMap::new();
                        nested.insert("score".to_string(), Value::Float(f64::NAN));
                        ctx.store().set("name", Value::Map(nested))?;
                        Ok(Outcome::done())
                    }),
            )
            .store(StoreType::builder("Address").scalar("city", ""))
            .build()
            .unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let user = schema().instance("User").unwrap();
        assert_eq!(user.get("name").unwrap(), Value::from("anonymous"));
        assert_eq!(user.get("age").unwrap(), Value::from(0i64));
        assert_eq!(user.get("address").unwrap(), Value::Null);
        assert!(user.is_root());
        assert!(!user.is_mutable());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let user = schema().instance("User").unwrap();
        assert_eq!(user.get("email").unwrap_err().kind(), ErrorKind::UnknownField);
    }

    #[test]
    fn write_outside_action_is_illegal() {
        let user = schema().instance("User").unwrap();
        let err = user.set("name", "Mallory").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalMutation);
        assert_eq!(user.get("name").unwrap(), Value::from("anonymous"));
    }

    #[test]
    fn write_inside_action_is_applied() {
        let user = schema().instance("User").unwrap();
        user.dispatch("rename", vec![Value::from("Ada")]).unwrap();
        assert_eq!(user.get("name").unwrap(), Value::from("Ada"));
    }

    #[test]
    fn non_finite_write_inside_action_leaves_field_unchanged() {
        let user = schema().instance("User").unwrap();
        let err = user.dispatch("corrupt", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonSerializablePayload);
        assert!(err.to_string().contains("name/score"));
        assert_eq!(user.get("name").unwrap(), Value::from("anonymous"));
    }

    #[test]
    fn initial_state_builds_children() {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), Value::from("Oslo"));
        let mut state = BTreeMap::new();
        state.insert("age".to_string(), Value::from("41"));
        state.insert("address".to_string(), Value::Map(address));

        let user = schema().create("User").initial(state).build().unwrap();
        assert_eq!(user.get("age").unwrap(), Value::from(41i64));

        let address = user.child("address").unwrap().unwrap();
        assert_eq!(address.get("city").unwrap(), Value::from("Oslo"));
        assert!(address.parent().unwrap().ptr_eq(&user));
    }

    #[test]
    fn snapshot_contains_subtree_without_parent_link() {
        let mut state = BTreeMap::new();
        state.insert("name".to_string(), Value::from("Ada"));
        let user = schema().create("User").initial(state).build().unwrap();

        let snapshot = user.to_value();
        let map = snapshot.as_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["name"], Value::from("Ada"));
        assert_eq!(map["address"], Value::Null);
    }

    #[test]
    fn display_mentions_type() {
        let user = schema().instance("User").unwrap();
        assert!(user.to_string().starts_with("User#"));
    }
}
