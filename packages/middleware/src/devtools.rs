//! Replay and time-travel recorder.
//!
//! [`DevTools`] records every completed top-level action of a tree together
//! with the tree's state after it ran. A recorded action can be dispatched
//! again ([`DevTools::replay`]) and any recorded state can be put back
//! ([`DevTools::jump_to`]). Actions dispatched from inside a handler are
//! part of their parent action and are not recorded separately.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use storetree_core::{Action, ActionLabel, Middleware, Next, StoreRef, Value};
use storetree_serde::value_to_json;

use crate::error::{MiddlewareError, Result};

/// Configuration for [`DevTools`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevToolsConfig {
    /// Oldest entries are dropped beyond this many.
    pub max_history: usize,
    /// Store a full-tree snapshot with each entry. Needed for `jump_to`.
    pub record_state: bool,
}

impl Default for DevToolsConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            record_state: true,
        }
    }
}

/// One completed action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub label: ActionLabel,
    /// Payload with store references replaced by snapshots.
    pub args: Vec<Value>,
    /// Root snapshot after the action, if state recording is on.
    pub state: Option<Value>,
}

impl ActionRecord {
    fn to_json(&self) -> Result<serde_json::Value> {
        let args = self
            .args
            .iter()
            .map(value_to_json)
            .collect::<storetree_core::Result<Vec<_>>>()?;
        let state = match &self.state {
            Some(state) => value_to_json(state)?,
            None => serde_json::Value::Null,
        };
        Ok(serde_json::json!({
            "label": self.label.to_string(),
            "args": args,
            "state": state,
        }))
    }
}

pub struct DevTools {
    config: DevToolsConfig,
    history: RefCell<VecDeque<ActionRecord>>,
    in_action: Cell<bool>,
    suppressed: Cell<bool>,
}

impl DevTools {
    pub fn new(config: DevToolsConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            history: RefCell::new(VecDeque::new()),
            in_action: Cell::new(false),
            suppressed: Cell::new(false),
        })
    }

    pub fn config(&self) -> &DevToolsConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.history.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ActionRecord> {
        self.history.borrow().get(index).cloned()
    }

    pub fn history(&self) -> Vec<ActionRecord> {
        self.history.borrow().iter().cloned().collect()
    }

    /// Labels of the recorded actions, oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.history
            .borrow()
            .iter()
            .map(|r| r.label.to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.history.borrow_mut().clear();
    }

    fn record(&self, index: usize) -> Result<ActionRecord> {
        self.get(index).ok_or(MiddlewareError::NoSuchRecord {
            index,
            len: self.len(),
        })
    }

    /// Dispatch the action recorded at `index` again at `root`. The replayed
    /// action is recorded like any other.
    pub fn replay(&self, root: &StoreRef, index: usize) -> Result<Option<Value>> {
        let record = self.record(index)?;
        debug!(index, label = %record.label, "replaying action");
        let target = root.resolve(&record.label.path)?;
        Ok(target.dispatch(record.label.name.as_str(), record.args)?)
    }

    /// Restore the state recorded at `index`. Nothing is recorded.
    pub fn jump_to(&self, root: &StoreRef, index: usize) -> Result<()> {
        let state = self
            .record(index)?
            .state
            .ok_or(MiddlewareError::StateNotRecorded { index })?;
        debug!(index, "time travel");
        self.restore_unrecorded(root, state)
    }

    /// Replace the whole state of `root` with `snapshot`. Nothing is
    /// recorded.
    pub fn import_state(&self, root: &StoreRef, snapshot: Value) -> Result<()> {
        self.restore_unrecorded(root, snapshot)
    }

    fn restore_unrecorded(&self, root: &StoreRef, snapshot: Value) -> Result<()> {
        let previous = self.suppressed.replace(true);
        let result = root.restore(snapshot);
        self.suppressed.set(previous);
        match result? {
            Some(_) => Ok(()),
            None => Err(MiddlewareError::Aborted {
                label: storetree_core::INIT_ACTION.to_string(),
            }),
        }
    }

    /// The history as JSON: `{"actions": [{"label", "args", "state"}, ...]}`.
    pub fn export_json(&self) -> Result<serde_json::Value> {
        let actions = self
            .history
            .borrow()
            .iter()
            .map(ActionRecord::to_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::json!({ "actions": actions }))
    }

    fn push(&self, record: ActionRecord) {
        if self.config.max_history == 0 {
            return;
        }
        let mut history = self.history.borrow_mut();
        while history.len() >= self.config.max_history {
            history.pop_front();
        }
        history.push_back(record);
    }
}

impl Middleware for DevTools {
    fn handle(
        &self,
        root: &StoreRef,
        action: Action,
        next: Next<'_>,
    ) -> storetree_core::Result<Option<Value>> {
        if self.suppressed.get() || self.in_action.get() {
            return next.run(action);
        }

        let label = action.label().clone();
        let args = action.args().iter().map(Value::to_plain).collect();

        self.in_action.set(true);
        let result = next.run(action);
        self.in_action.set(false);

        if let Ok(Some(_)) = &result {
            let state = self.config.record_state.then(|| root.to_value());
            self.push(ActionRecord { label, args, state });
        }
        result
    }
}
