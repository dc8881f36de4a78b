//! Cooperative task scheduler.
//!
//! Asynchronous handlers and thunks continue their work through a
//! [`Scheduler`]: `defer` queues a continuation for the current turn and
//! `set_timeout` queues one on a virtual clock. Nothing runs until the host
//! drives the queue with [`Scheduler::run_microtasks`],
//! [`Scheduler::advance`] or [`Scheduler::run_until_idle`], so execution is
//! deterministic and single-threaded.
//!
//! Scheduling can be forbidden for a span of code with
//! [`Scheduler::forbid`]; attempts inside that span fail with
//! [`Error::SchedulingForbidden`]. [`Scheduler::guard_sync_handlers`] asks
//! the dispatch engine to forbid scheduling around every synchronous handler
//! it runs while the guard is held.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::{Error, Result};

/// A queued continuation.
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Handle to a queued task, usable with [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Default)]
pub struct Scheduler {
    now: Cell<u64>,
    next_id: Cell<u64>,
    microtasks: RefCell<VecDeque<(TimerId, Task)>>,
    /// Keyed by (due time, id) so equal deadlines run in scheduling order.
    timers: RefCell<BTreeMap<(u64, TimerId), Task>>,
    forbidden: RefCell<Vec<String>>,
    sync_guards: Cell<usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.microtasks.borrow().len() + self.timers.borrow().len()
    }

    pub fn is_forbidden(&self) -> bool {
        !self.forbidden.borrow().is_empty()
    }

    /// Forbid scheduling until the guard is dropped. `action` names the
    /// action being protected in the resulting errors.
    pub fn forbid(&self, action: &str) -> ScheduleGuard<'_> {
        self.forbidden.borrow_mut().push(action.to_string());
        ScheduleGuard { scheduler: self }
    }

    /// Forbid scheduling inside each synchronous handler the engine runs
    /// until the guard is dropped. Asynchronous handlers are unaffected.
    pub fn guard_sync_handlers(&self) -> SyncHandlerGuard<'_> {
        self.sync_guards.set(self.sync_guards.get() + 1);
        SyncHandlerGuard { scheduler: self }
    }

    pub fn guards_sync_handlers(&self) -> bool {
        self.sync_guards.get() > 0
    }

    fn check_allowed(&self) -> Result<()> {
        match self.forbidden.borrow().last() {
            Some(action) => Err(Error::SchedulingForbidden {
                action: action.clone(),
            }),
            None => Ok(()),
        }
    }

    fn allocate(&self) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        TimerId(id)
    }

    /// Queue a continuation to run before any timer.
    pub fn defer<F>(&self, task: F) -> Result<TimerId>
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.check_allowed()?;
        let id = self.allocate();
        trace!(%id, "defer");
        self.microtasks.borrow_mut().push_back((id, Box::new(task)));
        Ok(id)
    }

    /// Queue a continuation to run once the clock has moved `delay_ms`
    /// past now.
    pub fn set_timeout<F>(&self, delay_ms: u64, task: F) -> Result<TimerId>
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.check_allowed()?;
        let id = self.allocate();
        let due = self.now().saturating_add(delay_ms);
        trace!(%id, due, "set_timeout");
        self.timers.borrow_mut().insert((due, id), Box::new(task));
        Ok(id)
    }

    /// Drop a queued task. Returns whether it was still queued.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut microtasks = self.microtasks.borrow_mut();
        if let Some(pos) = microtasks.iter().position(|(queued, _)| *queued == id) {
            microtasks.remove(pos);
            return true;
        }
        drop(microtasks);

        let mut timers = self.timers.borrow_mut();
        let key = timers.keys().find(|(_, queued)| *queued == id).copied();
        key.and_then(|key| timers.remove(&key)).is_some()
    }

    /// Run deferred continuations, including those queued while running,
    /// until none are left. Returns how many ran.
    pub fn run_microtasks(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            // Release the borrow before running: tasks may queue more work.
            let next = self.microtasks.borrow_mut().pop_front();
            let Some((id, task)) = next else {
                return Ok(ran);
            };
            debug!(%id, "running deferred task");
            task()?;
            ran += 1;
        }
    }

    fn pop_timer_due_by(&self, deadline: u64) -> Option<(u64, TimerId, Task)> {
        let mut timers = self.timers.borrow_mut();
        let (due, _) = *timers.keys().next()?;
        if due > deadline {
            return None;
        }
        timers.pop_first().map(|((due, id), task)| (due, id, task))
    }

    fn run_timers_until(&self, deadline: u64) -> Result<usize> {
        let mut ran = self.run_microtasks()?;
        while let Some((due, id, task)) = self.pop_timer_due_by(deadline) {
            self.now.set(self.now().max(due));
            debug!(%id, now = self.now(), "running timer");
            task()?;
            ran += 1 + self.run_microtasks()?;
        }
        Ok(ran)
    }

    /// Move the clock forward by `ms`, running everything that falls due.
    /// Returns how many tasks ran.
    pub fn advance(&self, ms: u64) -> Result<usize> {
        let deadline = self.now().saturating_add(ms);
        let ran = self.run_timers_until(deadline)?;
        self.now.set(deadline);
        Ok(ran)
    }

    /// Run until the queue is empty, moving the clock to each timer's
    /// deadline in turn.
    pub fn run_until_idle(&self) -> Result<usize> {
        self.run_timers_until(u64::MAX)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .field("forbidden", &self.is_forbidden())
            .finish()
    }
}

/// Re-allows scheduling when dropped.
#[must_use = "scheduling is allowed again as soon as the guard is dropped"]
pub struct ScheduleGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for ScheduleGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.forbidden.borrow_mut().pop();
    }
}

/// Ends synchronous-handler protection when dropped.
#[must_use = "synchronous handlers are unguarded as soon as the guard is dropped"]
pub struct SyncHandlerGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for SyncHandlerGuard<'_> {
    fn drop(&mut self) {
        let guards = &self.scheduler.sync_guards;
        guards.set(guards.get().saturating_sub(1));
    }
}
