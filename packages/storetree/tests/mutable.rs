use std::cell::{Cell, RefCell};
use std::rc::Rc;

use storetree::prelude::*;

fn schema() -> Rc<Schema> {
    Schema::builder()
        .store(
            StoreType::builder("User")
                .mutable()
                .scalar("title", "")
                .child("avatar", "Avatar")
                .children("notes", "Note"),
        )
        .store(StoreType::builder("Avatar").scalar("url", ""))
        .store(StoreType::builder("Note").scalar("text", ""))
        .build()
        .unwrap()
}

type Seen = Rc<RefCell<Vec<(String, Vec<Value>)>>>;

fn recorder(seen: &Seen) -> Rc<dyn Middleware> {
    let seen = seen.clone();
    from_fn(move |_root, action: Action, next: Next<'_>| {
        seen.borrow_mut()
            .push((action.label().to_string(), action.args().to_vec()));
        next.run(action)
    })
}

#[test]
fn title_write_is_exactly_one_action() {
    let seen: Seen = Rc::default();
    let schema = schema();
    let user = schema.create("User").middleware(recorder(&seen)).build().unwrap();
    let avatar = schema.create("Avatar").build().unwrap();
    user.set("avatar", &avatar).unwrap();
    seen.borrow_mut().clear();

    let avatar_changes = Rc::new(Cell::new(0));
    {
        let avatar_changes = avatar_changes.clone();
        avatar.observe(move |_| avatar_changes.set(avatar_changes.get() + 1));
    }

    user.set("title", "Dr.").unwrap();

    assert_eq!(user.get("title").unwrap(), Value::from("Dr."));
    assert_eq!(
        *seen.borrow(),
        vec![("@title".to_string(), vec![Value::from("Dr.")])]
    );
    assert_eq!(avatar_changes.get(), 0);
}

#[test]
fn collection_calls_become_method_actions() {
    let seen: Seen = Rc::default();
    let schema = schema();
    let user = schema.create("User").middleware(recorder(&seen)).build().unwrap();
    let note = schema.create("Note").build().unwrap();

    let notes = user.list("notes").unwrap();
    notes.push(&note).unwrap();
    notes.pop().unwrap();

    let labels: Vec<String> = seen.borrow().iter().map(|(l, _)| l.clone()).collect();
    assert_eq!(labels, vec!["@notes.push()", "@notes.pop()"]);
    assert!(note.is_root());
}

#[test]
fn children_inherit_mutability_and_label_their_path() {
    let seen: Seen = Rc::default();
    let schema = schema();
    let user = schema.create("User").middleware(recorder(&seen)).build().unwrap();
    let note = schema.create("Note").build().unwrap();

    assert_eq!(note.set("text", "x").unwrap_err().kind(), ErrorKind::IllegalMutation);

    user.list("notes").unwrap().push(&note).unwrap();
    note.set("text", "remember milk").unwrap();

    assert_eq!(seen.borrow().last().unwrap().0, "notes/0/@text");
    assert_eq!(note.get("text").unwrap(), Value::from("remember milk"));
}

#[test]
fn aborted_write_changes_nothing() {
    let schema = schema();
    let readonly = from_fn(|_root, action: Action, next: Next<'_>| {
        if action.name().starts_with('@') && action.name() != "@@INIT" {
            Ok(None)
        } else {
            next.run(action)
        }
    });
    let user = schema
        .create("User")
        .initial(to_value(&serde_json::json!({"title": "Mx."})).unwrap())
        .middleware(readonly)
        .build()
        .unwrap();

    user.set("title", "Dr.").unwrap();
    assert_eq!(user.get("title").unwrap(), Value::from("Mx."));
}
