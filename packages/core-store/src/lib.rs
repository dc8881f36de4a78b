//! Store tree with root-routed action dispatch.
//!
//! Application state is a tree of [`StoreRef`] instances. Each store type
//! declares its fields and the actions that may change them; nothing else
//! may. Every action travels to the root of its tree, passes the root's
//! [`Middleware`] pipeline, is applied at the store it was aimed at and is
//! then broadcast to that store's descendants.
//!
//! - [`Schema`]: field and action registries for all store types
//! - [`StoreRef`]: a live store, its tree links and its fields
//! - [`Middleware`]: interceptors around every dispatch at a root
//! - [`WriteOp`]: writes to mutable stores, expressed as reserved actions
//! - [`Scheduler`]: cooperative continuations for asynchronous work
//!
//! # Example
//!
//! ```rust
//! use storetree_core::{Outcome, Schema, StoreType, Value};
//!
//! let schema = Schema::builder()
//!     .store(
//!         StoreType::builder("TodoList")
//!             .children("todos", "Todo")
//!             .action("add", |ctx, args| {
//!                 let todo = ctx.store().schema().instance("Todo")?;
//!                 ctx.store().list("todos")?.push(&todo)?;
//!                 todo.set("text", args[0].clone())?;
//!                 Ok(Outcome::done())
//!             }),
//!     )
//!     .store(StoreType::builder("Todo").scalar("text", ""))
//!     .build()
//!     .unwrap();
//!
//! let list = schema.instance("TodoList").unwrap();
//! list.dispatch("add", vec![Value::from("milk")]).unwrap();
//! let todo = list.list("todos").unwrap().get(0).unwrap();
//! assert_eq!(todo.path().to_string(), "todos/0");
//! assert_eq!(todo.get("text").unwrap(), Value::from("milk"));
//! ```

mod collection;
mod dispatch;
mod error;
mod middleware;
mod mutable;
mod observe;
mod path;
mod scheduler;
mod schema;
mod store;
mod thunk;
mod tree;
mod value;

pub use collection::{RefList, RefMap};
pub use dispatch::{ActionContext, ActionRef, DispatchPhase, Outcome, Propagation, THUNK_ACTION};
pub use error::{Error, ErrorKind, Result};
pub use middleware::{from_fn, Action, Middleware, Next};
pub use mutable::{CollectionMethod, WriteOp, INIT_ACTION};
pub use observe::{Change, ObserverId};
pub use path::{is_identifier, ActionLabel, Path, PathError};
pub use scheduler::{ScheduleGuard, Scheduler, SyncHandlerGuard, Task, TimerId};
pub use schema::{
    ActionMode, ActionSpec, Coercion, FieldDescriptor, FieldKind, Handler, Mutability, Schema,
    SchemaBuilder, StoreType, StoreTypeBuilder,
};
pub use store::{StoreBuilder, StoreId, StoreRef};
pub use thunk::{Thunk, ThunkInterceptor};
pub use value::Value;
