//! Mutable write interceptor.
//!
//! Writes made outside of an action to a store whose effective mutability
//! is true are converted into reserved actions and dispatched like any
//! other action, so middleware and replay tooling cannot tell them apart:
//!
//! - `store.set("title", v)` becomes `@title` with payload `[v]`
//! - `store.list("todos")?.push(&t)` becomes `@todos.push()` with payload `[t]`
//!
//! Reserved actions bypass the action registry and never broadcast.

use std::fmt;

use crate::schema::FieldKind;
use crate::store::StoreRef;
use crate::{Error, Result, Value};

/// Reserved action that replaces a store's state from a snapshot.
pub const INIT_ACTION: &str = "@@INIT";

/// Mutating methods of reference arrays and maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMethod {
    /// Arrays: `[store]`.
    Push,
    /// Arrays: `[index, store]`; maps: `[key, store]`.
    Insert,
    /// Arrays: `[index, store]`.
    Set,
    /// Arrays: `[index]`; maps: `[key]`.
    Remove,
    /// Arrays: `[]`.
    Pop,
    /// Arrays and maps: `[]`.
    Clear,
}

impl CollectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionMethod::Push => "push",
            CollectionMethod::Insert => "insert",
            CollectionMethod::Set => "set",
            CollectionMethod::Remove => "remove",
            CollectionMethod::Pop => "pop",
            CollectionMethod::Clear => "clear",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "push" => CollectionMethod::Push,
            "insert" => CollectionMethod::Insert,
            "set" => CollectionMethod::Set,
            "remove" => CollectionMethod::Remove,
            "pop" => CollectionMethod::Pop,
            "clear" => CollectionMethod::Clear,
            _ => return None,
        })
    }
}

/// A write expressed as a reserved action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// `@field`
    Assign { field: String },
    /// `@field.method()`
    Collection {
        field: String,
        method: CollectionMethod,
    },
}

impl WriteOp {
    pub fn assign(field: &str) -> Self {
        WriteOp::Assign {
            field: field.to_string(),
        }
    }

    pub fn collection(field: &str, method: CollectionMethod) -> Self {
        WriteOp::Collection {
            field: field.to_string(),
            method,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            WriteOp::Assign { field } | WriteOp::Collection { field, .. } => field,
        }
    }

    /// Action name of this write.
    pub fn action_name(&self) -> String {
        self.to_string()
    }

    /// Parse an implicit-write action name.
    ///
    /// Returns `Ok(None)` for names that are not implicit writes (ordinary
    /// names and `@@` names).
    pub fn parse(name: &str) -> Result<Option<Self>> {
        let Some(body) = name.strip_prefix('@') else {
            return Ok(None);
        };
        if body.starts_with('@') {
            return Ok(None);
        }
        match body.split_once('.') {
            None => Ok(Some(WriteOp::assign(body))),
            Some((field, call)) => {
                let method = call
                    .strip_suffix("()")
                    .and_then(CollectionMethod::parse)
                    .ok_or_else(|| Error::invalid_action(name, "unknown collection method"))?;
                Ok(Some(WriteOp::collection(field, method)))
            }
        }
    }

    /// Apply the write directly to `target`.
    pub(crate) fn apply(&self, target: &StoreRef, mut args: Vec<Value>) -> Result<Value> {
        match self {
            WriteOp::Assign { field } => {
                if args.len() != 1 {
                    return Err(Error::invalid_action(
                        &self.action_name(),
                        format!("expected 1 argument, got {}", args.len()),
                    ));
                }
                target.write_field(field, args.remove(0))
            }
            WriteOp::Collection { field, method } => {
                crate::collection::apply_method(target, field, *method, args)
            }
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Assign { field } => write!(f, "@{}", field),
            WriteOp::Collection { field, method } => write!(f, "@{}.{}()", field, method.as_str()),
        }
    }
}

enum WriteAccess {
    /// An action is executing: apply in place.
    Direct,
    /// Mutable store outside an action: synthesize a reserved action.
    Synthesize,
}

impl StoreRef {
    fn write_access(&self, field: &str) -> Result<WriteAccess> {
        if self.root().engine().in_action() {
            Ok(WriteAccess::Direct)
        } else if self.is_mutable() {
            Ok(WriteAccess::Synthesize)
        } else {
            Err(Error::IllegalMutation {
                store: self.to_string(),
                field: field.to_string(),
            })
        }
    }

    /// Route a write through the write gate.
    ///
    /// Returns `None` when a middleware aborted the synthesized action.
    pub(crate) fn mutate(&self, op: WriteOp, args: Vec<Value>) -> Result<Option<Value>> {
        self.store_type().require_field(op.field())?;
        match self.write_access(op.field())? {
            WriteAccess::Direct => op.apply(self, args).map(Some),
            WriteAccess::Synthesize => self.dispatch(op.action_name(), args),
        }
    }
}

/// Apply an `@@INIT` payload: `[snapshot]`.
pub(crate) fn restore(target: &StoreRef, args: Vec<Value>) -> Result<Value> {
    let [snapshot]: [Value; 1] = args.try_into().map_err(|args: Vec<Value>| {
        Error::invalid_action(
            INIT_ACTION,
            format!("expected 1 argument, got {}", args.len()),
        )
    })?;
    tracing::debug!(store = %target, "restoring state");
    target.hydrate(&snapshot)?;
    Ok(Value::Null)
}

/// Whether `kind` accepts `method`.
pub(crate) fn supports(kind: &FieldKind, method: CollectionMethod) -> bool {
    match kind {
        FieldKind::RefArray(_) => true,
        FieldKind::RefMap(_) => matches!(
            method,
            CollectionMethod::Insert | CollectionMethod::Remove | CollectionMethod::Clear
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::middleware::{from_fn, Action, Next};
    use crate::{ErrorKind, Schema, StoreType};

    #[test]
    fn names_roundtrip() {
        for name in ["@title", "@todos.push()", "@byId.remove()"] {
            let op = WriteOp::parse(name).unwrap().unwrap();
            assert_eq!(op.action_name(), name);
        }
        assert_eq!(WriteOp::parse("rename").unwrap(), None);
        assert_eq!(WriteOp::parse(INIT_ACTION).unwrap(), None);
        assert_eq!(
            WriteOp::parse("@todos.shuffle()").unwrap_err().kind(),
            ErrorKind::InvalidAction
        );
    }

    fn recording_schema() -> Rc<Schema> {
        Schema::builder()
            .store(
                StoreType::builder("User")
                    .mutable()
                    .scalar("title", "")
                    .child("profile", "Profile"),
            )
            .store(StoreType::builder("Profile").scalar("bio", ""))
            .build()
            .unwrap()
    }

    #[test]
    fn property_write_becomes_one_action() {
        let seen: Rc<RefCell<Vec<(String, Vec<Value>)>>> = Rc::default();
        let recorder = {
            let seen = seen.clone();
            from_fn(move |_root, action: Action, next: Next<'_>| {
                seen.borrow_mut()
                    .push((action.label().to_string(), action.args().to_vec()));
                next.run(action)
            })
        };
        let user = recording_schema()
            .create("User")
            .middleware(recorder)
            .build()
            .unwrap();

        user.set("title", "Dr.").unwrap();

        assert_eq!(user.get("title").unwrap(), Value::from("Dr."));
        assert_eq!(
            *seen.borrow(),
            vec![("@title".to_string(), vec![Value::from("Dr.")])]
        );
    }

    #[test]
    fn inherited_mutability_labels_with_path() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let recorder = {
            let seen = seen.clone();
            from_fn(move |_root, action: Action, next: Next<'_>| {
                seen.borrow_mut().push(action.label().to_string());
                next.run(action)
            })
        };
        let schema = recording_schema();
        let user = schema.create("User").middleware(recorder).build().unwrap();
        let profile = schema.instance("Profile").unwrap();
        assert!(!profile.is_mutable());

        user.set("profile", &profile).unwrap();
        assert!(profile.is_mutable());
        profile.set("bio", "hello").unwrap();

        assert_eq!(*seen.borrow(), vec!["@profile", "profile/@bio"]);
        assert_eq!(profile.get("bio").unwrap(), Value::from("hello"));
    }

    #[test]
    fn non_serializable_write_leaves_field_unchanged() {
        let user = recording_schema().instance("User").unwrap();
        let err = user.set("title", f64::INFINITY).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonSerializablePayload);
        assert_eq!(user.get("title").unwrap(), Value::from(""));
    }

    #[test]
    fn aborted_write_is_silent() {
        let user = recording_schema()
            .create("User")
            .middleware(from_fn(|_root, _action: Action, _next: Next<'_>| Ok(None)))
            .build()
            .unwrap();
        user.set("title", "ignored").unwrap();
        assert_eq!(user.get("title").unwrap(), Value::from(""));
    }

    #[test]
    fn init_requires_one_argument() {
        let user = recording_schema().instance("User").unwrap();
        let err = user.dispatch(INIT_ACTION, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
    }
}
