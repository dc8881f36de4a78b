//! The dispatch engine.
//!
//! A dispatch travels up to the root of the tree, through the root's
//! middleware pipeline, back down the same path to the store it was aimed
//! at, and from there is broadcast depth-first to descendants:
//!
//! ```text
//! Requested -> RoutedToRoot -> MiddlewareProcessed -> RoutedToTarget -> Broadcasting -> Done
//!                                   \-> Aborted (a middleware did not proceed)
//! ```
//!
//! Each root owns an [`Engine`] holding its pipeline, its scheduler and the
//! call-context bookkeeping: whether a synchronous handler is executing and
//! how many actions are open. Handlers run inside a [`HandlerScope`] that
//! restores that state on every exit path.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::middleware::{Action, Middleware, Pipeline};
use crate::mutable::{WriteOp, INIT_ACTION};
use crate::scheduler::Scheduler;
use crate::schema::ActionMode;
use crate::store::StoreRef;
use crate::thunk::{self, Thunk};
use crate::{ActionLabel, Error, Result, Value};

/// Reserved name carried by thunk dispatches.
pub const THUNK_ACTION: &str = "@@THUNK";

/// Progress of one in-flight dispatch, reported in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Requested,
    RoutedToRoot,
    MiddlewareProcessed,
    RoutedToTarget,
    Broadcasting,
    Done,
    Aborted,
}

/// Whether a handled action continues into the handler's descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Continue,
    Stop,
}

/// Result of an action handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub value: Value,
    pub propagation: Propagation,
}

impl Outcome {
    /// No result; keep broadcasting.
    pub fn done() -> Self {
        Self::default()
    }

    /// No result; do not broadcast into this store's subtree.
    pub fn stop() -> Self {
        Self {
            value: Value::Null,
            propagation: Propagation::Stop,
        }
    }

    /// Return `value` to the dispatcher; keep broadcasting.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            propagation: Propagation::Continue,
        }
    }

    #[must_use]
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }
}

/// What a handler sees while it runs.
pub struct ActionContext<'a> {
    store: &'a StoreRef,
    label: &'a ActionLabel,
}

impl<'a> ActionContext<'a> {
    /// The store whose handler is executing.
    pub fn store(&self) -> &'a StoreRef {
        self.store
    }

    /// Label of the dispatched action (the original target's path).
    pub fn label(&self) -> &'a ActionLabel {
        self.label
    }

    /// Scheduler of the tree this handler runs in.
    pub fn scheduler(&self) -> Rc<Scheduler> {
        self.store.scheduler()
    }

    /// Dispatch a further action at the executing store.
    pub fn dispatch(&self, action: impl Into<ActionRef>, args: Vec<Value>) -> Result<Option<Value>> {
        self.store.dispatch(action, args)
    }
}

/// Either a registered action name or a thunk.
#[derive(Clone)]
pub enum ActionRef {
    Named(String),
    Thunk(Thunk),
}

impl ActionRef {
    /// Wrap a function to be run in place of a named handler.
    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn(&StoreRef, &[Value]) -> Result<Value> + 'static,
    {
        ActionRef::Thunk(Rc::new(f))
    }
}

impl From<&str> for ActionRef {
    fn from(name: &str) -> Self {
        ActionRef::Named(name.to_string())
    }
}

impl From<String> for ActionRef {
    fn from(name: String) -> Self {
        ActionRef::Named(name)
    }
}

impl From<&String> for ActionRef {
    fn from(name: &String) -> Self {
        ActionRef::Named(name.clone())
    }
}

impl fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ActionRef::Thunk(_) => f.write_str("Thunk"),
        }
    }
}

/// Per-root dispatch state.
#[derive(Default)]
pub(crate) struct Engine {
    pipeline: RefCell<Option<Pipeline>>,
    scheduler: RefCell<Option<Rc<Scheduler>>>,
    in_sync_handler: Cell<bool>,
    open_actions: Cell<usize>,
}

impl Engine {
    pub(crate) fn install_middleware(&self, middleware: Vec<Rc<dyn Middleware>>) {
        *self.pipeline.borrow_mut() = Some(Pipeline::new(middleware));
    }

    pub(crate) fn pipeline(&self) -> Pipeline {
        self.pipeline
            .borrow_mut()
            .get_or_insert_with(|| Pipeline::new(Vec::new()))
            .clone()
    }

    pub(crate) fn set_scheduler(&self, scheduler: Rc<Scheduler>) {
        *self.scheduler.borrow_mut() = Some(scheduler);
    }

    pub(crate) fn scheduler(&self) -> Rc<Scheduler> {
        self.scheduler
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(Scheduler::new()))
            .clone()
    }

    pub(crate) fn in_sync_handler(&self) -> bool {
        self.in_sync_handler.get()
    }

    /// Whether an action is executing, which opens the write gate.
    pub(crate) fn in_action(&self) -> bool {
        self.open_actions.get() > 0
    }

    /// Enter a handler of the given mode. `opens_gate` is false for thunks,
    /// which mutate only through further dispatches.
    pub(crate) fn enter(&self, mode: ActionMode, opens_gate: bool) -> HandlerScope<'_> {
        let previous = self.in_sync_handler.replace(mode == ActionMode::Sync);
        if opens_gate {
            self.open_actions.set(self.open_actions.get() + 1);
        }
        HandlerScope {
            engine: self,
            previous,
            opens_gate,
        }
    }
}

/// Restores the engine's call context when a handler exits.
pub(crate) struct HandlerScope<'a> {
    engine: &'a Engine,
    previous: bool,
    opens_gate: bool,
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        self.engine.in_sync_handler.set(self.previous);
        if self.opens_gate {
            self.engine
                .open_actions
                .set(self.engine.open_actions.get().saturating_sub(1));
        }
    }
}

impl StoreRef {
    /// Dispatch an action at this store.
    ///
    /// Returns the value produced by this store's handler (or the thunk),
    /// `Some(Value::Null)` when the store has no handler for the name, and
    /// `None` when a middleware aborted the dispatch.
    pub fn dispatch(&self, action: impl Into<ActionRef>, args: Vec<Value>) -> Result<Option<Value>> {
        let (name, thunk) = match action.into() {
            ActionRef::Named(name) => (name, None),
            ActionRef::Thunk(thunk) => (THUNK_ACTION.to_string(), Some(thunk)),
        };
        trace!(store = %self, action = %name, phase = ?DispatchPhase::Requested);

        for (i, arg) in args.iter().enumerate() {
            arg.check_serializable(&format!("{}[{}]", name, i))?;
        }

        let mode = if thunk.is_some() {
            ActionMode::Async
        } else {
            self.action_mode(&name)
        };

        let root = self.root();
        if mode == ActionMode::Async && root.engine().in_sync_handler() {
            return Err(Error::AsyncFromSyncForbidden { action: name });
        }

        let label = ActionLabel::new(self.path(), name);
        trace!(%label, phase = ?DispatchPhase::RoutedToRoot);

        let pipeline = root.engine().pipeline();
        let result = pipeline.run(&root, Action::new(label.clone(), args, mode, thunk))?;
        if result.is_none() {
            debug!(%label, phase = ?DispatchPhase::Aborted, "middleware aborted dispatch");
        }
        Ok(result)
    }

    /// Dispatch by wire-format label (`"a/0/ACTION"`), resolving the target
    /// from this store.
    pub fn dispatch_label(&self, label: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let label = ActionLabel::parse(label)?;
        self.resolve(&label.path)?.dispatch(label.name, args)
    }

    /// Scheduler of the tree this store belongs to.
    pub fn scheduler(&self) -> Rc<Scheduler> {
        self.root().engine().scheduler()
    }

    fn action_mode(&self, name: &str) -> ActionMode {
        if name.starts_with('@') {
            return ActionMode::Sync;
        }
        self.store_type()
            .action(name)
            .map_or(ActionMode::Sync, |spec| spec.mode)
    }
}

/// Terminal stage of the pipeline: route down and apply.
pub(crate) fn apply(root: &StoreRef, action: Action) -> Result<Option<Value>> {
    trace!(label = %action.label(), phase = ?DispatchPhase::MiddlewareProcessed);
    let (label, args, thunk) = action.into_parts();

    let target = root.resolve(&label.path)?;
    trace!(%label, target = %target, phase = ?DispatchPhase::RoutedToTarget);

    let engine = root.engine();
    let value = if let Some(thunk) = thunk {
        thunk::run_thunk(&target, &thunk, &args)?
    } else if label.name == INIT_ACTION {
        let _scope = engine.enter(ActionMode::Sync, true);
        crate::mutable::restore(&target, args)?
    } else if let Some(op) = WriteOp::parse(&label.name)? {
        let _scope = engine.enter(ActionMode::Sync, true);
        op.apply(&target, args)?
    } else if label.name.starts_with('@') {
        return Err(Error::invalid_action(&label.name, "reserved action name"));
    } else {
        deliver(engine, &target, &label, &args)?
    };

    trace!(%label, phase = ?DispatchPhase::Done);
    Ok(Some(value))
}

/// Run the named handler at `store`, then broadcast into its children
/// unless the handler stopped propagation.
fn deliver(engine: &Engine, store: &StoreRef, label: &ActionLabel, args: &[Value]) -> Result<Value> {
    let mut value = Value::Null;
    let mut descend = true;

    if let Some(spec) = store.store_type().action(&label.name).cloned() {
        if spec.mode == ActionMode::Async && engine.in_sync_handler() {
            return Err(Error::AsyncFromSyncForbidden {
                action: label.name.clone(),
            });
        }
        let scheduler = engine.scheduler();
        let _forbid = (spec.mode == ActionMode::Sync && scheduler.guards_sync_handlers()).then(|| {
            scheduler.forbid(&ActionLabel::new(store.path(), label.name.clone()).to_string())
        });
        let outcome = {
            let _scope = engine.enter(spec.mode, true);
            let ctx = ActionContext { store, label };
            (spec.handler)(&ctx, args)?
        };
        descend = spec.propagate && outcome.propagation == Propagation::Continue;
        value = outcome.value;
    }

    if descend {
        let children = store.direct_children();
        if !children.is_empty() {
            trace!(%label, store = %store, phase = ?DispatchPhase::Broadcasting);
        }
        for child in &children {
            deliver(engine, child, label, args)?;
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::{ErrorKind, Schema, StoreType};

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log, who: &'static str, outcome: Outcome) -> impl Fn(&ActionContext<'_>, &[Value]) -> Result<Outcome> {
        let log = log.clone();
        move |_, _| {
            log.borrow_mut().push(who.to_string());
            Ok(outcome.clone())
        }
    }

    fn tree(log: &Log, middle_outcome: Outcome) -> StoreRef {
        let schema = Schema::builder()
            .store(
                StoreType::builder("App")
                    .child("left", "Middle")
                    .child("right", "Middle")
                    .action("reset", recorder(log, "app", Outcome::done())),
            )
            .store(
                StoreType::builder("Middle")
                    .scalar("name", "")
                    .child("leaf", "Leaf")
                    .action("reset", {
                        let log = log.clone();
                        move |ctx, _| {
                            let name = ctx.store().get("name")?;
                            log.borrow_mut()
                                .push(format!("middle:{}", name.as_str().unwrap_or("")));
                            Ok(middle_outcome.clone())
                        }
                    }),
            )
            .store(
                StoreType::builder("Leaf")
                    .scalar("value", 0)
                    .action("reset", recorder(log, "leaf", Outcome::done())),
            )
            .build()
            .unwrap();

        let state = initial_state();
        schema.create("App").initial(state).build().unwrap()
    }

    fn initial_state() -> Value {
        use std::collections::BTreeMap;
        let middle = |name: &str| {
            let mut leaf = BTreeMap::new();
            leaf.insert("value".to_string(), Value::from(1i64));
            let mut m = BTreeMap::new();
            m.insert("name".to_string(), Value::from(name));
            m.insert("leaf".to_string(), Value::Map(leaf));
            Value::Map(m)
        };
        let mut app = BTreeMap::new();
        app.insert("left".to_string(), middle("l"));
        app.insert("right".to_string(), middle("r"));
        Value::Map(app)
    }

    #[test]
    fn broadcast_is_depth_first_parent_before_children() {
        let log: Log = Rc::default();
        let app = tree(&log, Outcome::done());
        app.dispatch("reset", vec![]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["app", "middle:l", "leaf", "middle:r", "leaf"]
        );
    }

    #[test]
    fn stop_prunes_only_that_subtree() {
        let log: Log = Rc::default();
        let app = tree(&log, Outcome::stop());
        app.dispatch("reset", vec![]).unwrap();
        assert_eq!(*log.borrow(), vec!["app", "middle:l", "middle:r"]);
    }

    #[test]
    fn dispatch_below_root_starts_at_target() {
        let log: Log = Rc::default();
        let app = tree(&log, Outcome::done());
        let right = app.child("right").unwrap().unwrap();
        right.dispatch("reset", vec![]).unwrap();
        assert_eq!(*log.borrow(), vec!["middle:r", "leaf"]);
    }

    #[test]
    fn unknown_action_is_a_noop() {
        let log: Log = Rc::default();
        let app = tree(&log, Outcome::done());
        assert_eq!(app.dispatch("nothing", vec![]).unwrap(), Some(Value::Null));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handler_value_is_returned() {
        let schema = Schema::builder()
            .store(StoreType::builder("Calc").action("sum", |_, args| {
                let total: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok(Outcome::value(total))
            }))
            .build()
            .unwrap();
        let calc = schema.instance("Calc").unwrap();
        let result = calc
            .dispatch("sum", vec![Value::from(2i64), Value::from(3i64)])
            .unwrap();
        assert_eq!(result, Some(Value::from(5i64)));
    }

    #[test]
    fn non_propagating_action_stays_at_target() {
        let log: Log = Rc::default();
        let schema = Schema::builder()
            .store(
                StoreType::builder("Parent")
                    .child("kid", "Kid")
                    .action_spec(
                        "ping",
                        crate::ActionSpec::sync(recorder(&log, "parent", Outcome::done()))
                            .no_propagate(),
                    ),
            )
            .store(StoreType::builder("Kid").action("ping", recorder(&log, "kid", Outcome::done())))
            .build()
            .unwrap();
        let mut state = std::collections::BTreeMap::new();
        state.insert("kid".to_string(), Value::map());
        let parent = schema.create("Parent").initial(state).build().unwrap();
        parent.dispatch("ping", vec![]).unwrap();
        assert_eq!(*log.borrow(), vec!["parent"]);
    }

    #[test]
    fn async_from_sync_is_forbidden() {
        let schema = Schema::builder()
            .store(
                StoreType::builder("Loader")
                    .scalar("status", "idle")
                    .action("start", |ctx, _| {
                        ctx.dispatch("load", vec![])?;
                        Ok(Outcome::done())
                    })
                    .async_action("load", |ctx, _| {
                        ctx.store().set("status", "loading")?;
                        Ok(Outcome::done())
                    })
                    .action("noop", |_, _| Ok(Outcome::done())),
            )
            .build()
            .unwrap();
        let loader = schema.instance("Loader").unwrap();

        let err = loader.dispatch("start", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AsyncFromSyncForbidden);
        assert_eq!(loader.get("status").unwrap(), Value::from("idle"));

        // The context is restored after the failure.
        assert!(!loader.engine().in_sync_handler());
        assert!(!loader.engine().in_action());
        loader.dispatch("load", vec![]).unwrap();
        assert_eq!(loader.get("status").unwrap(), Value::from("loading"));
    }

    #[test]
    fn failing_handler_restores_context() {
        let schema = Schema::builder()
            .store(
                StoreType::builder("Broken")
                    .scalar("x", 0)
                    .action("explode", |_, _| Err(Error::other("boom"))),
            )
            .build()
            .unwrap();
        let store = schema.instance("Broken").unwrap();
        assert!(store.dispatch("explode", vec![]).is_err());
        assert!(!store.engine().in_action());
        assert!(!store.engine().in_sync_handler());
        assert_eq!(store.set("x", 1).unwrap_err().kind(), ErrorKind::IllegalMutation);
    }

    #[test]
    fn non_serializable_args_are_rejected() {
        let schema = Schema::builder()
            .store(StoreType::builder("S").action("a", |_, _| Ok(Outcome::done())))
            .build()
            .unwrap();
        let store = schema.instance("S").unwrap();
        let err = store.dispatch("a", vec![Value::Float(f64::NAN)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonSerializablePayload);
    }

    #[test]
    fn reserved_names_are_not_handlers() {
        let schema = Schema::builder()
            .store(StoreType::builder("S"))
            .build()
            .unwrap();
        let store = schema.instance("S").unwrap();
        let err = store.dispatch("@@BOGUS", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
    }

    #[test]
    fn dispatch_label_routes_from_root() {
        let log: Log = Rc::default();
        let app = tree(&log, Outcome::done());
        app.dispatch_label("left/leaf/reset", vec![]).unwrap();
        assert_eq!(*log.borrow(), vec!["leaf"]);
        assert_eq!(
            app.dispatch_label("missing/reset", vec![]).unwrap_err().kind(),
            ErrorKind::NoRoute
        );
    }
}
