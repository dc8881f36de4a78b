//! Change notification.
//!
//! Observers registered on a store are called after each committed write to
//! one of its fields, including writes made while restoring a snapshot.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::store::StoreRef;

/// A committed field write.
#[derive(Debug, Clone)]
pub struct Change {
    pub store: StoreRef,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback = Rc<dyn Fn(&Change)>;

#[derive(Default)]
pub(crate) struct Observers {
    next_id: Cell<u64>,
    callbacks: RefCell<Vec<(ObserverId, Callback)>>,
}

impl StoreRef {
    /// Call `f` after every committed write to a field of this store.
    pub fn observe<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&Change) + 'static,
    {
        let observers = &self.0.observers;
        let id = ObserverId(observers.next_id.get());
        observers.next_id.set(id.0 + 1);
        observers.callbacks.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut callbacks = self.0.observers.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    pub(crate) fn notify(&self, field: &str) {
        // Snapshot the list so callbacks may (un)register observers.
        let callbacks: Vec<Callback> = self
            .0
            .observers
            .callbacks
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let change = Change {
            store: self.clone(),
            field: field.to_string(),
        };
        for callback in callbacks {
            callback(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Schema, StoreType, Value};

    #[test]
    fn observers_see_committed_writes() {
        let schema = Schema::builder()
            .store(
                StoreType::builder("Doc")
                    .mutable()
                    .scalar("title", "")
                    .children("pages", "Page"),
            )
            .store(StoreType::builder("Page"))
            .build()
            .unwrap();
        let doc = schema.instance("Doc").unwrap();
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let id = {
            let seen = seen.clone();
            doc.observe(move |change| {
                let value = change.store.get(&change.field).unwrap();
                seen.borrow_mut().push(format!("{}={:?}", change.field, value.as_str()));
            })
        };

        doc.set("title", "one").unwrap();
        doc.list("pages")
            .unwrap()
            .push(&schema.instance("Page").unwrap())
            .unwrap();
        assert_eq!(*seen.borrow(), vec!["title=Some(\"one\")", "pages=None"]);

        assert!(doc.unobserve(id));
        assert!(!doc.unobserve(id));
        doc.set("title", "two").unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(doc.get("title").unwrap(), Value::from("two"));
    }

    #[test]
    fn rejected_writes_do_not_notify() {
        let schema = Schema::builder()
            .store(StoreType::builder("Doc").scalar("title", ""))
            .build()
            .unwrap();
        let doc = schema.instance("Doc").unwrap();
        let count = Rc::new(Cell::new(0));
        {
            let count = count.clone();
            doc.observe(move |_| count.set(count.get() + 1));
        }
        assert!(doc.set("title", "nope").is_err());
        assert_eq!(count.get(), 0);
    }
}
