//! Storetree: application state as a tree of stores changed only by actions.
//!
//! Every action dispatched anywhere in a tree travels up to the root, passes
//! the root's middleware, is applied at its target and then broadcast to the
//! target's descendants. Stores marked mutable turn plain field writes into
//! actions, so recording and replay see every change.
//!
//! This crate re-exports the layers:
//! - [`store`]: schema, store tree, dispatch engine, scheduler
//! - [`json`]: typed payloads and JSON snapshots
//! - [`middleware`]: devtools, protector, logger
//!
//! # Example
//!
//! ```rust
//! use storetree::prelude::*;
//!
//! let schema = Schema::builder()
//!     .store(StoreType::builder("Note").mutable().scalar("title", ""))
//!     .build()
//!     .unwrap();
//!
//! let devtools = DevTools::new(DevToolsConfig::default());
//! let note = schema.create("Note").middleware(devtools.clone()).build().unwrap();
//!
//! note.set("title", "Dr.").unwrap();
//! assert_eq!(devtools.labels(), vec!["@title"]);
//! assert_eq!(to_json(&note).unwrap(), serde_json::json!({"title": "Dr."}));
//! ```

pub use storetree_core as store;
pub use storetree_middleware as middleware;
pub use storetree_serde as json;

pub use storetree_core::{Error, ErrorKind, Result, Schema, StoreRef, StoreType, Value};

/// Everything needed to declare store types and work with a tree.
pub mod prelude {
    pub use storetree_core::{
        from_fn, path, Action, ActionContext, ActionRef, Change, Error, ErrorKind, Middleware,
        Mutability, Next, Outcome, Propagation, Result, Schema, Scheduler, StoreRef, StoreType,
        Value,
    };
    pub use storetree_middleware::{DevTools, DevToolsConfig, Logger, LoggerConfig, Protector};
    pub use storetree_serde::{
        create_from_json, from_value, restore_json, to_json, to_value, TypedDispatch,
    };
}
