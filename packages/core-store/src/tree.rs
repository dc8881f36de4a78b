//! Store identity and tree structure.
//!
//! Every store has at most one parent. The link is weak and records the
//! field that owns the child; array indices and map keys are recovered from
//! the parent's slot when a path is needed, so they never go stale.

use std::rc::Weak;

use tracing::debug;

use crate::schema::FieldKind;
use crate::store::{Slot, StoreNode, StoreRef};
use crate::{Error, Path, Result, Value};

pub(crate) struct ParentLink {
    pub(crate) parent: Weak<StoreNode>,
    pub(crate) field: String,
}

impl StoreRef {
    pub fn parent(&self) -> Option<StoreRef> {
        self.0
            .parent
            .borrow()
            .as_ref()
            .and_then(|link| link.parent.upgrade())
            .map(StoreRef)
    }

    /// Name of the parent field holding this store.
    pub fn parent_field(&self) -> Option<String> {
        let link = self.0.parent.borrow();
        match link.as_ref() {
            Some(link) if link.parent.strong_count() > 0 => Some(link.field.clone()),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Follow parent links to the top of the tree.
    pub fn root(&self) -> StoreRef {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &StoreRef) -> bool {
        let mut current = other.parent();
        while let Some(store) = current {
            if store.ptr_eq(self) {
                return true;
            }
            current = store.parent();
        }
        false
    }

    /// Route from the root to this store.
    ///
    /// Reference arrays contribute an index token and reference maps a key
    /// token after the field name.
    pub fn path(&self) -> Path {
        let (Some(parent), Some(field)) = (self.parent(), self.parent_field()) else {
            return Path::root();
        };
        let token = match parent.0.slots.borrow().get(&field) {
            Some(Slot::List(items)) => items
                .iter()
                .position(|c| c.ptr_eq(self))
                .map(|i| i.to_string()),
            Some(Slot::Map(items)) => items
                .iter()
                .find(|(_, c)| c.ptr_eq(self))
                .map(|(k, _)| k.clone()),
            _ => None,
        };
        let path = parent.path().child(field);
        match token {
            Some(token) => path.child(token),
            None => path,
        }
    }

    /// Navigate from this store along `path`.
    pub fn resolve(&self, path: &Path) -> Result<StoreRef> {
        let no_route = || Error::NoRoute { path: path.clone() };
        let mut current = self.clone();
        let mut components = path.iter();
        while let Some(field) = components.next() {
            if current.store_type().field(field).is_none() {
                return Err(no_route());
            }
            let next = match current.slot(field)? {
                Slot::Ref(child) => child,
                Slot::List(items) => {
                    let index: usize = components
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(no_route)?;
                    items.get(index).cloned()
                }
                Slot::Map(items) => {
                    let key = components.next().ok_or_else(no_route)?;
                    items.get(key).cloned()
                }
                Slot::Scalar(_) => None,
            };
            current = next.ok_or_else(no_route)?;
        }
        Ok(current)
    }

    /// Attach `child` under a reference or reference-array field.
    ///
    /// Attaching a child that already sits in the same field is a no-op.
    /// Map fields need a key; use [`StoreRef::map`].
    pub fn attach(&self, field: &str, child: &StoreRef) -> Result<()> {
        let descriptor = self.store_type().require_field(field)?;
        if self
            .parent_of(child)
            .is_some_and(|(p, f)| p.ptr_eq(self) && f == field)
        {
            return Ok(());
        }
        match descriptor.kind {
            FieldKind::Ref(_) => self.set(field, child),
            FieldKind::RefArray(_) => self.list(field)?.push(child),
            _ => Err(self.kind_mismatch(field, "reference or reference array")),
        }
    }

    /// Remove this store from its parent's field, through the parent's
    /// normal write path. A root is left unchanged.
    pub fn detach(&self) -> Result<()> {
        let (Some(parent), Some(field)) = (self.parent(), self.parent_field()) else {
            return Ok(());
        };
        match parent.slot(&field)? {
            Slot::Ref(_) => parent.set(&field, Value::Null),
            Slot::List(items) => match items.iter().position(|c| c.ptr_eq(self)) {
                Some(index) => parent.list(&field)?.remove(index).map(|_| ()),
                None => Ok(()),
            },
            Slot::Map(items) => match items.iter().find(|(_, c)| c.ptr_eq(self)) {
                Some((key, _)) => parent.map(&field)?.remove(key).map(|_| ()),
                None => Ok(()),
            },
            Slot::Scalar(_) => Ok(()),
        }
    }

    /// Direct children in field declaration order.
    pub(crate) fn direct_children(&self) -> Vec<StoreRef> {
        let slots = self.0.slots.borrow();
        self.store_type()
            .fields()
            .iter()
            .filter_map(|f| slots.get(&f.name))
            .flat_map(Slot::stores)
            .collect()
    }

    fn parent_of(&self, child: &StoreRef) -> Option<(StoreRef, String)> {
        child.parent().zip(child.parent_field())
    }

    /// Ownership check run before `child` is placed in `field`.
    pub(crate) fn check_attach(&self, field: &str, child: &StoreRef) -> Result<()> {
        if child.ptr_eq(self) || child.is_ancestor_of(self) {
            return Err(Error::CyclicAttach {
                child: child.to_string(),
                field: field.to_string(),
            });
        }
        match self.parent_of(child) {
            None => Ok(()),
            Some((parent, owner_field)) if parent.ptr_eq(self) && owner_field == field => Ok(()),
            Some(_) => Err(Error::AlreadyOwned {
                child: child.to_string(),
                field: field.to_string(),
            }),
        }
    }

    pub(crate) fn link(&self, field: &str, child: &StoreRef) {
        debug!(parent = %self, child = %child, field, "attach");
        *child.0.parent.borrow_mut() = Some(ParentLink {
            parent: self.downgrade(),
            field: field.to_string(),
        });
    }

    pub(crate) fn unlink(&self) {
        if self.0.parent.borrow_mut().take().is_some() {
            debug!(store = %self, "detach");
        }
    }
}
