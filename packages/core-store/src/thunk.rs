//! Thunks: functions dispatched in place of action names.
//!
//! A thunk receives the store it was dispatched at and the payload, and
//! composes further dispatches, typically scheduling some of them through
//! the tree's [`Scheduler`](crate::Scheduler). Thunks are asynchronous by
//! construction. They never write fields directly.

use std::rc::Rc;

use tracing::debug;

use crate::middleware::{Action, Middleware, Next};
use crate::schema::ActionMode;
use crate::store::StoreRef;
use crate::{Result, Value};

/// A function dispatched as an action.
pub type Thunk = Rc<dyn Fn(&StoreRef, &[Value]) -> Result<Value>>;

/// First stage of every root pipeline: runs thunk dispatches and passes
/// named actions on.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThunkInterceptor;

impl Middleware for ThunkInterceptor {
    fn handle(&self, root: &StoreRef, action: Action, next: Next<'_>) -> Result<Option<Value>> {
        let Some(thunk) = action.thunk().cloned() else {
            return next.run(action);
        };
        let target = root.resolve(&action.label().path)?;
        run_thunk(&target, &thunk, action.args()).map(Some)
    }
}

pub(crate) fn run_thunk(target: &StoreRef, thunk: &Thunk, args: &[Value]) -> Result<Value> {
    debug!(store = %target, "running thunk");
    let root = target.root();
    let _scope = root.engine().enter(ActionMode::Async, false);
    thunk(target, args)
}
