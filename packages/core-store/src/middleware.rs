//! Root middleware pipeline.
//!
//! Every dispatch in a tree passes through the root's ordered list of
//! middleware before it reaches its target. A stage receives the action and
//! a [`Next`] continuation; it may rewrite the action, run code around the
//! rest of the chain, or return without calling `next` to abort the
//! dispatch (the caller then sees `Ok(None)`).
//!
//! ```rust
//! use std::rc::Rc;
//! use storetree_core::{from_fn, Action, Next, Schema, StoreType};
//!
//! let schema = Schema::builder()
//!     .store(StoreType::builder("Doc").mutable().scalar("title", ""))
//!     .build()
//!     .unwrap();
//!
//! let uppercase = from_fn(|_root, action: Action, next: Next<'_>| {
//!     let args = action
//!         .args()
//!         .iter()
//!         .map(|v| v.as_str().map_or(v.clone(), |s| s.to_uppercase().into()))
//!         .collect();
//!     next.run(action.with_args(args))
//! });
//!
//! let doc = schema.create("Doc").middleware(uppercase).build().unwrap();
//! doc.set("title", "draft").unwrap();
//! assert_eq!(doc.get("title").unwrap().as_str(), Some("DRAFT"));
//! ```

use std::fmt;
use std::rc::Rc;

use crate::dispatch;
use crate::schema::ActionMode;
use crate::store::StoreRef;
use crate::thunk::{Thunk, ThunkInterceptor};
use crate::{ActionLabel, Result, Value};

/// An in-flight action as seen by middleware.
pub struct Action {
    label: ActionLabel,
    args: Vec<Value>,
    mode: ActionMode,
    thunk: Option<Thunk>,
}

impl Action {
    pub(crate) fn new(label: ActionLabel, args: Vec<Value>, mode: ActionMode, thunk: Option<Thunk>) -> Self {
        Self {
            label,
            args,
            mode,
            thunk,
        }
    }

    /// `path/NAME` label of the action.
    pub fn label(&self) -> &ActionLabel {
        &self.label
    }

    pub fn name(&self) -> &str {
        &self.label.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn mode(&self) -> ActionMode {
        self.mode
    }

    /// Whether this dispatch carries a thunk instead of a named action.
    pub fn is_thunk(&self) -> bool {
        self.thunk.is_some()
    }

    pub(crate) fn thunk(&self) -> Option<&Thunk> {
        self.thunk.as_ref()
    }

    /// Retarget the action. The new path is resolved from the root.
    #[must_use]
    pub fn with_label(mut self, label: ActionLabel) -> Self {
        self.label = label;
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub(crate) fn into_parts(self) -> (ActionLabel, Vec<Value>, Option<Thunk>) {
        (self.label, self.args, self.thunk)
    }
}

impl Clone for Action {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            args: self.args.clone(),
            mode: self.mode,
            thunk: self.thunk.clone(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label)
            .field("args", &self.args)
            .field("mode", &self.mode)
            .field("thunk", &self.thunk.is_some())
            .finish()
    }
}

/// A stage of the root pipeline.
pub trait Middleware {
    /// Process `action` for the tree rooted at `root`.
    ///
    /// Call `next.run(action)` to proceed. Returning without calling it
    /// aborts the dispatch; returning an error propagates to the dispatcher.
    fn handle(&self, root: &StoreRef, action: Action, next: Next<'_>) -> Result<Option<Value>>;
}

/// Continuation into the remaining stages.
pub struct Next<'a> {
    root: &'a StoreRef,
    rest: &'a [Rc<dyn Middleware>],
}

impl Next<'_> {
    /// Run the rest of the chain, ending with delivery to the target.
    pub fn run(self, action: Action) -> Result<Option<Value>> {
        match self.rest.split_first() {
            Some((stage, rest)) => stage.handle(
                self.root,
                action,
                Next {
                    root: self.root,
                    rest,
                },
            ),
            None => dispatch::apply(self.root, action),
        }
    }
}

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&StoreRef, Action, Next<'_>) -> Result<Option<Value>>,
{
    fn handle(&self, root: &StoreRef, action: Action, next: Next<'_>) -> Result<Option<Value>> {
        (self.0)(root, action, next)
    }
}

/// Middleware from a closure.
pub fn from_fn<F>(f: F) -> Rc<dyn Middleware>
where
    F: Fn(&StoreRef, Action, Next<'_>) -> Result<Option<Value>> + 'static,
{
    Rc::new(FnMiddleware(f))
}

/// Ordered stages of one root. Thunk interception always runs first.
#[derive(Clone)]
pub(crate) struct Pipeline {
    stages: Rc<[Rc<dyn Middleware>]>,
}

impl Pipeline {
    pub(crate) fn new(user: Vec<Rc<dyn Middleware>>) -> Self {
        let stages: Vec<Rc<dyn Middleware>> = std::iter::once(Rc::new(ThunkInterceptor) as Rc<dyn Middleware>)
            .chain(user)
            .collect();
        Self {
            stages: stages.into(),
        }
    }

    pub(crate) fn run(&self, root: &StoreRef, action: Action) -> Result<Option<Value>> {
        Next {
            root,
            rest: &self.stages,
        }
        .run(action)
    }
}
