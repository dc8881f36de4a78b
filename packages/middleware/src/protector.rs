//! Guard against asynchrony hidden in synchronous actions.
//!
//! While any synchronous handler runs, the tree's scheduler refuses new work
//! with `SchedulingForbidden`. The guard applies per handler, so a
//! synchronous child reached by the broadcast of an asynchronous action is
//! guarded too. Asynchronous handlers and thunks may schedule.

use storetree_core::{Action, Middleware, Next, Result, StoreRef, Value};
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct Protector;

impl Middleware for Protector {
    fn handle(&self, root: &StoreRef, action: Action, next: Next<'_>) -> Result<Option<Value>> {
        let scheduler = root.scheduler();
        trace!(label = %action.label(), "guarding synchronous handlers");
        let _guard = scheduler.guard_sync_handlers();
        next.run(action)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use storetree_core::{ErrorKind, Outcome, Schema, StoreType};

    use super::*;

    fn schema() -> Rc<Schema> {
        Schema::builder()
            .store(
                StoreType::builder("Saver")
                    .scalar("status", "idle")
                    .action("save_later", |ctx, _| {
                        let store = ctx.store().clone();
                        ctx.scheduler().set_timeout(10, move || {
                            store.dispatch("saved", vec![])?;
                            Ok(())
                        })?;
                        Ok(Outcome::done())
                    })
                    .async_action("save_async", |ctx, _| {
                        ctx.store().set("status", "saving")?;
                        let store = ctx.store().clone();
                        ctx.scheduler().set_timeout(10, move || {
                            store.dispatch("saved", vec![])?;
                            Ok(())
                        })?;
                        Ok(Outcome::done())
                    })
                    .action("saved", |ctx, _| {
                        ctx.store().set("status", "saved")?;
                        Ok(Outcome::done())
                    })
                    .child("backup", "Backup"),
            )
            .store(
                // Shares the async action's name with a synchronous handler.
                StoreType::builder("Backup").action("save_async", |ctx, _| {
                    ctx.scheduler().set_timeout(5, || Ok(()))?;
                    Ok(Outcome::done())
                }),
            )
            .build()
            .unwrap()
    }

    fn store() -> StoreRef {
        schema()
            .create("Saver")
            .middleware(Rc::new(Protector))
            .build()
            .unwrap()
    }

    #[test]
    fn timer_in_sync_action_fails() {
        let saver = store();
        let err = saver.dispatch("save_later", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchedulingForbidden);
        assert_eq!(saver.scheduler().pending(), 0);
        assert!(!saver.scheduler().is_forbidden());

        // The guard is released: an unrelated dispatch works normally.
        saver.dispatch("saved", vec![]).unwrap();
        assert_eq!(saver.get("status").unwrap(), Value::from("saved"));
    }

    #[test]
    fn sync_child_of_async_action_is_guarded() {
        let mut state = BTreeMap::new();
        state.insert("backup".to_string(), Value::Map(BTreeMap::new()));
        let saver = schema()
            .create("Saver")
            .initial(Value::Map(state))
            .middleware(Rc::new(Protector))
            .build()
            .unwrap();
        assert!(saver.child("backup").unwrap().is_some());

        let err = saver.dispatch("save_async", vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchedulingForbidden);
        assert!(err.to_string().contains("backup/save_async"));
        // The parent's own timer was queued before the child ran.
        assert_eq!(saver.scheduler().pending(), 1);
        assert!(!saver.scheduler().is_forbidden());
    }

    #[test]
    fn async_actions_may_schedule() {
        let saver = store();
        saver.dispatch("save_async", vec![]).unwrap();
        assert_eq!(saver.get("status").unwrap(), Value::from("saving"));
        saver.scheduler().run_until_idle().unwrap();
        assert_eq!(saver.get("status").unwrap(), Value::from("saved"));
    }
}
