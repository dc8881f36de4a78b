//! Adapters over reference-array and reference-map fields.
//!
//! Reads go straight to the slot. Mutating calls go through the write gate,
//! so on a mutable store outside an action they become `@field.method()`
//! actions carrying the call arguments.

use std::collections::BTreeMap;

use crate::mutable::{supports, CollectionMethod, WriteOp};
use crate::schema::FieldKind;
use crate::store::{Slot, StoreRef};
use crate::{Error, Path, Result, Value};

/// View of a reference-array field.
pub struct RefList<'a> {
    store: &'a StoreRef,
    field: String,
}

/// View of a reference-map field.
pub struct RefMap<'a> {
    store: &'a StoreRef,
    field: String,
}

impl StoreRef {
    /// Adapter for a reference-array field.
    pub fn list(&self, field: &str) -> Result<RefList<'_>> {
        match self.store_type().require_field(field)?.kind {
            FieldKind::RefArray(_) => Ok(RefList {
                store: self,
                field: field.to_string(),
            }),
            _ => Err(self.kind_mismatch(field, "reference array")),
        }
    }

    /// Adapter for a reference-map field.
    pub fn map(&self, field: &str) -> Result<RefMap<'_>> {
        match self.store_type().require_field(field)?.kind {
            FieldKind::RefMap(_) => Ok(RefMap {
                store: self,
                field: field.to_string(),
            }),
            _ => Err(self.kind_mismatch(field, "reference map")),
        }
    }
}

fn removed(value: Option<Value>) -> Option<StoreRef> {
    match value {
        Some(Value::Store(store)) => Some(store),
        _ => None,
    }
}

impl RefList<'_> {
    fn items(&self) -> Vec<StoreRef> {
        match self.store.0.slots.borrow().get(&self.field) {
            Some(Slot::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn call(&self, method: CollectionMethod, args: Vec<Value>) -> Result<Option<Value>> {
        self.store
            .mutate(WriteOp::collection(&self.field, method), args)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StoreRef> {
        self.items().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<StoreRef> {
        self.items()
    }

    pub fn push(&self, child: &StoreRef) -> Result<()> {
        self.call(CollectionMethod::Push, vec![Value::from(child)])
            .map(|_| ())
    }

    pub fn insert(&self, index: usize, child: &StoreRef) -> Result<()> {
        self.call(
            CollectionMethod::Insert,
            vec![Value::from(index), Value::from(child)],
        )
        .map(|_| ())
    }

    /// Replace the element at `index`, detaching the previous one.
    pub fn set(&self, index: usize, child: &StoreRef) -> Result<()> {
        self.call(
            CollectionMethod::Set,
            vec![Value::from(index), Value::from(child)],
        )
        .map(|_| ())
    }

    /// Remove and detach the element at `index`.
    pub fn remove(&self, index: usize) -> Result<Option<StoreRef>> {
        self.call(CollectionMethod::Remove, vec![Value::from(index)])
            .map(removed)
    }

    pub fn pop(&self) -> Result<Option<StoreRef>> {
        self.call(CollectionMethod::Pop, vec![]).map(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.call(CollectionMethod::Clear, vec![]).map(|_| ())
    }
}

impl RefMap<'_> {
    fn items(&self) -> BTreeMap<String, StoreRef> {
        match self.store.0.slots.borrow().get(&self.field) {
            Some(Slot::Map(items)) => items.clone(),
            _ => BTreeMap::new(),
        }
    }

    fn call(&self, method: CollectionMethod, args: Vec<Value>) -> Result<Option<Value>> {
        self.store
            .mutate(WriteOp::collection(&self.field, method), args)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<StoreRef> {
        self.items().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items().into_keys().collect()
    }

    pub fn to_map(&self) -> BTreeMap<String, StoreRef> {
        self.items()
    }

    /// Insert under `key`, detaching any store previously there.
    pub fn insert(&self, key: &str, child: &StoreRef) -> Result<()> {
        self.call(
            CollectionMethod::Insert,
            vec![Value::from(key), Value::from(child)],
        )
        .map(|_| ())
    }

    pub fn remove(&self, key: &str) -> Result<Option<StoreRef>> {
        self.call(CollectionMethod::Remove, vec![Value::from(key)])
            .map(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.call(CollectionMethod::Clear, vec![]).map(|_| ())
    }
}

struct Call<'a> {
    name: String,
    field: &'a str,
    args: std::vec::IntoIter<Value>,
}

impl Call<'_> {
    fn arity(&self, expected: usize) -> Result<()> {
        if self.args.len() == expected {
            Ok(())
        } else {
            Err(Error::invalid_action(
                &self.name,
                format!("expected {} arguments, got {}", expected, self.args.len()),
            ))
        }
    }

    fn next(&mut self) -> Result<Value> {
        self.args
            .next()
            .ok_or_else(|| Error::invalid_action(&self.name, "missing argument"))
    }

    fn index(&mut self) -> Result<usize> {
        match self.next()? {
            Value::Integer(i) => usize::try_from(i).map_err(|_| {
                Error::invalid_action(&self.name, format!("index {} is not a valid position", i))
            }),
            other => Err(Error::invalid_action(
                &self.name,
                format!("expected index, got {}", other.type_name()),
            )),
        }
    }

    fn key(&mut self) -> Result<String> {
        match self.next()? {
            Value::String(key) => {
                Path::try_from_components(vec![key.clone()])?;
                Ok(key)
            }
            other => Err(Error::invalid_action(
                &self.name,
                format!("expected key, got {}", other.type_name()),
            )),
        }
    }

    fn out_of_bounds(&self, index: usize, len: usize) -> Error {
        Error::invalid_action(
            &self.name,
            format!("index {} out of bounds for {} of length {}", index, self.field, len),
        )
    }
}

/// Apply a collection method to `target.field`. Returns the removed store
/// for `remove`/`pop`, `Null` otherwise.
pub(crate) fn apply_method(
    target: &StoreRef,
    field: &str,
    method: CollectionMethod,
    args: Vec<Value>,
) -> Result<Value> {
    let descriptor = target.store_type().require_field(field)?.clone();
    let name = WriteOp::collection(field, method).action_name();
    if !supports(&descriptor.kind, method) {
        return Err(Error::invalid_action(
            &name,
            format!("not supported by {}", descriptor.kind.describe()),
        ));
    }
    let type_name = descriptor.kind.child_type().unwrap_or_default().to_string();
    let mut call = Call {
        name,
        field,
        args: args.into_iter(),
    };

    let result = match (target.slot(field)?, method) {
        (Slot::List(mut items), method) => {
            let result = match method {
                CollectionMethod::Push => {
                    call.arity(1)?;
                    let child = target.element_from_value(field, &type_name, call.next()?)?;
                    items.push(child);
                    Value::Null
                }
                CollectionMethod::Insert => {
                    call.arity(2)?;
                    let index = call.index()?;
                    if index > items.len() {
                        return Err(call.out_of_bounds(index, items.len()));
                    }
                    let child = target.element_from_value(field, &type_name, call.next()?)?;
                    items.insert(index, child);
                    Value::Null
                }
                CollectionMethod::Set => {
                    call.arity(2)?;
                    let index = call.index()?;
                    if index >= items.len() {
                        return Err(call.out_of_bounds(index, items.len()));
                    }
                    let child = target.element_from_value(field, &type_name, call.next()?)?;
                    if items[index].ptr_eq(&child) {
                        return Ok(Value::Null);
                    }
                    items[index] = child;
                    Value::Null
                }
                CollectionMethod::Remove => {
                    call.arity(1)?;
                    let index = call.index()?;
                    if index >= items.len() {
                        return Err(call.out_of_bounds(index, items.len()));
                    }
                    Value::Store(items.remove(index))
                }
                CollectionMethod::Pop => {
                    call.arity(0)?;
                    items.pop().map_or(Value::Null, Value::Store)
                }
                CollectionMethod::Clear => {
                    call.arity(0)?;
                    items.clear();
                    Value::Null
                }
            };
            target.replace_slot(field, Slot::List(items))?;
            result
        }
        (Slot::Map(mut items), method) => {
            let result = match method {
                CollectionMethod::Insert => {
                    call.arity(2)?;
                    let key = call.key()?;
                    let child = target.element_from_value(field, &type_name, call.next()?)?;
                    if items.get(&key).is_some_and(|c| c.ptr_eq(&child)) {
                        return Ok(Value::Null);
                    }
                    items.insert(key, child);
                    Value::Null
                }
                CollectionMethod::Remove => {
                    call.arity(1)?;
                    let key = call.key()?;
                    items.remove(&key).map_or(Value::Null, Value::Store)
                }
                CollectionMethod::Clear => {
                    call.arity(0)?;
                    items.clear();
                    Value::Null
                }
                other => {
                    return Err(Error::invalid_action(
                        &call.name,
                        format!("{}() is not supported by maps", other.as_str()),
                    ))
                }
            };
            target.replace_slot(field, Slot::Map(items))?;
            result
        }
        _ => {
            return Err(target.kind_mismatch(field, "reference collection"));
        }
    };

    target.notify(field);
    Ok(result)
}
