//! Task and event model.
//!
//! A [`Task`] is the only object that crosses into the scheduler: a run
//! closure, an element count, optional fan-in closure, and an optional
//! [`Event`] back-reference. Submitters hand tasks over as `Arc<Task>`; the
//! scheduler never owns task memory, it only drives the atomic counters.
//!
//! # Counter invariants
//!
//! - `0 <= started <= elts` and `0 <= completed <= elts` at all times.
//! - `started` reaching 0 means no further claims are issued for the task.
//! - `completed` reaching 0 means the task is fully done; the fan-in closure
//!   and the event decrement fire exactly once, on whichever thread observes
//!   the 1 -> 0 crossing.
//! - A task is single-submission: both counters must still equal `elts` when
//!   it is added, and they are never re-armed.
//!
//! # Ordering
//!
//! `started` is only decremented under the queue lock, but stays atomic so the
//! counter getters are safe from any thread. The `completed` decrement uses
//! `AcqRel` so the thread that runs the fan-in closure observes every
//! sub-unit's writes.

use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Arguments passed to a task's run closure, once per claimed elt.
pub struct TaskArgs<'a> {
    /// Index of the worker thread executing this elt.
    pub thread_index: usize,
    /// Number of currently enabled worker threads.
    pub thread_count: usize,
    /// Which sub-unit this claim covers, counting down `elts - 1 ..= 0`.
    pub elt: u32,
    /// Total number of sub-units of the task.
    pub elts: u32,
    /// The event the task reports into, if any.
    pub event: Option<&'a Event>,
}

/// Arguments passed to a task's fan-in closure, exactly once per task.
pub struct CompleteArgs<'a> {
    /// Index of the worker thread that completed the last elt.
    pub thread_index: usize,
    /// Number of currently enabled worker threads.
    pub thread_count: usize,
    /// The event the task reports into, if any.
    pub event: Option<&'a Event>,
}

type RunFn = dyn Fn(&TaskArgs<'_>) + Send + Sync;
type CompleteFn = dyn Fn(&CompleteArgs<'_>) + Send + Sync;

/// Schedulable unit of work, optionally split into `elts` independently
/// claimable sub-units.
///
/// The run closure may execute concurrently on multiple threads, one call per
/// elt. Payload data lives in the closure captures; the scheduler never
/// inspects it.
pub struct Task {
    name: &'static str,
    elts: u32,
    started: AtomicU32,
    completed: AtomicU32,
    run: Box<RunFn>,
    complete: Option<Box<CompleteFn>>,
    event: Option<Arc<Event>>,
}

impl Task {
    /// Creates a task with `elts` claimable sub-units.
    ///
    /// # Panics
    ///
    /// Panics if `elts == 0`; a task with nothing to claim is always a bug at
    /// the call site.
    pub fn new<F>(name: &'static str, elts: u32, run: F) -> Self
    where
        F: Fn(&TaskArgs<'_>) + Send + Sync + 'static,
    {
        assert!(elts >= 1, "Task requires elts >= 1");
        Self {
            name,
            elts,
            started: AtomicU32::new(elts),
            completed: AtomicU32::new(elts),
            run: Box::new(run),
            complete: None,
            event: None,
        }
    }

    /// Attaches a fan-in closure, invoked once after every elt has executed.
    pub fn with_complete<F>(mut self, complete: F) -> Self
    where
        F: Fn(&CompleteArgs<'_>) + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(complete));
        self
    }

    /// Ties the task to an event. The event is incremented at submission and
    /// decremented when the task fully completes.
    pub fn with_event(mut self, event: Arc<Event>) -> Self {
        self.event = Some(event);
        self
    }

    /// Diagnostic label.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total number of sub-units.
    pub fn elts(&self) -> u32 {
        self.elts
    }

    /// Current value of the claim counter (`elts` down to 0).
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::Acquire)
    }

    /// Current value of the completion counter (`elts` down to 0).
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns `true` once every elt has executed and the fan-in has fired.
    pub fn is_completed(&self) -> bool {
        self.completed() == 0
    }

    pub(crate) fn event(&self) -> Option<&Arc<Event>> {
        self.event.as_ref()
    }

    /// Asserts the submission-time counter state. Catches task reuse before
    /// completion as well as double submission.
    pub(crate) fn assert_fresh(&self) {
        assert!(
            self.started() == self.elts && self.completed() == self.elts,
            "task {:?} resubmitted or reused before completion",
            self.name,
        );
    }

    /// Claims one elt. Returns the elt number for the claim.
    ///
    /// Must only be called under the queue lock, and only while the task is
    /// still in the logical queue (`started > 0`).
    pub(crate) fn claim(&self) -> u32 {
        let prev = self.started.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "claim on a fully started task");
        prev - 1
    }

    /// Runs the body for one claimed elt. Called without the queue lock.
    pub(crate) fn run_elt(&self, thread_index: usize, thread_count: usize, elt: u32) {
        let args = TaskArgs {
            thread_index,
            thread_count,
            elt,
            elts: self.elts,
            event: self.event.as_deref(),
        };
        (self.run)(&args);
    }

    /// Retires one executed elt. The caller that crosses 1 -> 0 runs the
    /// fan-in closure and decrements the event; it gets `true` back.
    pub(crate) fn finish_elt(&self, thread_index: usize, thread_count: usize) -> bool {
        let prev = self.completed.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "finish on a fully completed task");
        if prev != 1 {
            return false;
        }
        if let Some(complete) = &self.complete {
            complete(&CompleteArgs {
                thread_index,
                thread_count,
                event: self.event.as_deref(),
            });
        }
        if let Some(event) = &self.event {
            event.dec();
        }
        true
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("elts", &self.elts)
            .field("started", &self.started())
            .field("completed", &self.completed())
            .field("has_event", &self.event.is_some())
            .finish()
    }
}

/// Shared completion counter for fan-in dependency tracking.
///
/// The counter starts at 1: the waiter's own arrival token. Each task that
/// references the event adds 1 at submission and subtracts 1 at full
/// completion; each `wait()` call subtracts 1 once. The event therefore
/// triggers only once every referencing task is done *and* the waiter has
/// joined.
///
/// Multiple waiters are allowed; the counter goes negative and
/// [`triggered`](Self::triggered) tests `<= 0`, so late waiters of an already
/// triggered event return immediately.
///
/// Non-schedulable waiters block on the embedded condvar rather than
/// busy-spinning; `dec` takes the lock before notifying so a waiter cannot
/// miss the final decrement between its `triggered` check and its wait.
pub struct Event {
    count: AtomicIsize,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Event {
    /// Creates an event holding one arrival token for its waiter.
    pub fn new() -> Self {
        Self {
            count: AtomicIsize::new(1),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Returns `true` once every referencing task has completed and the
    /// waiter has joined.
    pub fn triggered(&self) -> bool {
        self.count.load(Ordering::Acquire) <= 0
    }

    pub(crate) fn inc(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) - 1 <= 0 {
            let _guard = self.lock.lock().expect("event mutex poisoned");
            self.cond.notify_all();
        }
    }

    /// Blocks the calling thread until the event triggers. Used for waiters
    /// that do not participate in the worker pool.
    pub(crate) fn wait_blocking(&self) {
        let mut guard = self.lock.lock().expect("event mutex poisoned");
        while !self.triggered() {
            guard = self.cond.wait(guard).expect("event mutex poisoned");
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("count", &self.count.load(Ordering::Acquire))
            .finish()
    }
}
