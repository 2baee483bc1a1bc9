//! Cooperative task scheduler.
//!
//! # Architecture
//!
//! ```text
//!                  ┌───────────────────────────────────────────────┐
//!                  │                TaskScheduler                  │
//!                  │                                               │
//!  Producers ─────►│ add(Front|Back) ──► Mutex<QueueState>         │
//!                  │                      ├─ RingDeque<Arc<Task>>  │
//!                  │                      ├─ front_live            │
//!                  │                      ├─ enabled set           │
//!                  │                      └─ terminate flag        │
//!                  │                          │                    │
//!                  │        Condvar (always broadcast)             │
//!                  │                          │                    │
//!                  │   Worker 0 … Worker N: run() ─► work() ─────► │──► task bodies
//!                  │                                               │    (unlocked)
//!                  │   wait(event): help-drain via work(nonblock)  │
//!                  └───────────────────────────────────────────────┘
//! ```
//!
//! One mutex serializes every queue-metadata mutation: ring contents and
//! indices, the front-inserted count, the terminate flag, and the enabled
//! set. Task bodies always run with the lock released, so bookkeeping stays
//! simple while execution is truly parallel. The condvar is broadcast on
//! every enqueue, every enable change, and on terminate; the thundering herd
//! is the price for never missing a wakeup.
//!
//! # Claim ordering
//!
//! - Back-end claims are LIFO: the newest back task is claimed first, which
//!   favors cache locality and depth-first draining of freshly spawned
//!   sub-work.
//! - Front-inserted tasks are always claimed ahead of any outstanding back
//!   task. Two priority levels, nothing more; there is no FIFO fairness
//!   across concurrent producers.
//!
//! # Correctness invariants
//!
//! - Every submitted elt is claimed exactly once (unless terminated first).
//! - The lock is never held while user code runs.
//! - A blocked `wait` on a worker thread keeps draining the queue, so the
//!   pool cannot deadlock with all workers waiting on events whose
//!   satisfying tasks are still queued.
//! - `terminate` stops new claims only; in-flight elts finish and queued,
//!   unclaimed tasks keep their counters untouched.

use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crossbeam_utils::Backoff;

use super::metrics::{Metrics, MetricsSnapshot};
use super::ring::RingDeque;
use super::task::{Event, Task};

/// Which end of the queue a task is inserted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEnd {
    /// Ahead of everything already queued. For work that must run next,
    /// e.g. continuations of an in-progress computation.
    Front,
    /// Ordinary independent work, claimed in LIFO order.
    Back,
}

/// Identifies the thread calling [`TaskScheduler::wait`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    /// A pool worker; it helps drain the queue while waiting.
    Worker(usize),
    /// Any other thread; it blocks on the event until triggered.
    External,
}

/// Scheduler configuration.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Number of worker thread slots. Fixed for the scheduler's lifetime;
    /// participation is adjusted via `set_enabled`, not by resizing.
    pub threads: usize,
    /// Initial task queue capacity. Must be a nonzero power of two. The
    /// queue doubles when full and never shrinks.
    pub initial_capacity: usize,
    /// Pin pool workers to cores (requires the `affinity` feature).
    pub pin_threads: bool,
}

impl SchedulerConfig {
    /// Validates the configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.threads > 0, "threads must be > 0");
        assert!(
            self.initial_capacity.is_power_of_two(),
            "initial_capacity must be a nonzero power of two"
        );
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            initial_capacity: 16 * 1024,
            pin_threads: false,
        }
    }
}

/// Everything the queue mutex protects.
struct QueueState {
    ring: RingDeque<Arc<Task>>,
    /// Live front-inserted entries; the leftmost `front_live` ring entries.
    /// While nonzero, claims come from the front end.
    front_live: usize,
    terminate: bool,
    enabled: Vec<bool>,
    num_enabled: usize,
    enqueued_back: u64,
    enqueued_front: u64,
}

/// Shared-memory cooperative task scheduler.
///
/// An explicit instance owned by the surrounding runtime; submitters receive
/// a reference (typically via `Arc`). The OS threads driving [`run`] are
/// created by the owner, e.g. a [`WorkerPool`](super::WorkerPool).
///
/// [`run`]: Self::run
pub struct TaskScheduler {
    state: Mutex<QueueState>,
    cond: Condvar,
    /// Mirror of `QueueState::num_enabled` for unlocked reads on the
    /// execution path.
    num_enabled: AtomicUsize,
    /// Mirror of `QueueState::terminate` for unlocked reads.
    terminating: AtomicBool,
    metrics: Metrics,
    threads: usize,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        config.validate();
        Self {
            state: Mutex::new(QueueState {
                ring: RingDeque::with_capacity(config.initial_capacity),
                front_live: 0,
                terminate: false,
                enabled: vec![true; config.threads],
                num_enabled: config.threads,
                enqueued_back: 0,
                enqueued_front: 0,
            }),
            cond: Condvar::new(),
            num_enabled: AtomicUsize::new(config.threads),
            terminating: AtomicBool::new(false),
            metrics: Metrics::new(config.threads),
            threads: config.threads,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("scheduler mutex poisoned")
    }

    /// Total worker thread slots.
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Number of currently enabled worker threads.
    pub fn num_enabled_threads(&self) -> usize {
        self.num_enabled.load(Ordering::Acquire)
    }

    /// Whether the given worker slot participates in claiming.
    pub fn is_enabled(&self, thread_index: usize) -> bool {
        assert!(thread_index < self.threads, "thread_index out of range");
        self.lock_state().enabled[thread_index]
    }

    /// Enables or disables a worker slot without destroying its OS thread.
    ///
    /// A disabled worker's `work` treats the queue as empty: it parks (or
    /// returns, when polling) instead of claiming. This supports runtime
    /// adjustable parallelism, e.g. nested parallel regions, without thread
    /// creation overhead. Broadcasts so a newly enabled worker wakes up.
    pub fn set_enabled(&self, thread_index: usize, enabled: bool) {
        assert!(thread_index < self.threads, "thread_index out of range");
        let mut state = self.lock_state();
        if state.enabled[thread_index] != enabled {
            state.enabled[thread_index] = enabled;
            if enabled {
                state.num_enabled += 1;
            } else {
                state.num_enabled -= 1;
            }
            self.num_enabled.store(state.num_enabled, Ordering::Release);
        }
        self.cond.notify_all();
    }

    /// Submits a task to one end of the queue.
    ///
    /// If the task references an [`Event`], the event is incremented before
    /// the task becomes visible in the queue; a racing waiter can therefore
    /// never observe a spuriously triggered event.
    ///
    /// A task may be submitted at most once. Submitting after [`terminate`]
    /// is permitted but the task will never be claimed.
    ///
    /// # Panics
    ///
    /// Panics if the task's counters show reuse before completion. Queue
    /// growth that fails to allocate aborts the process.
    ///
    /// [`terminate`]: Self::terminate
    pub fn add(&self, queue_end: QueueEnd, task: Arc<Task>) {
        task.assert_fresh();
        if let Some(event) = task.event() {
            event.inc();
        }
        let mut state = self.lock_state();
        match queue_end {
            QueueEnd::Back => {
                state.ring.push_back(task);
                state.enqueued_back += 1;
            }
            QueueEnd::Front => {
                state.ring.push_front(task);
                state.front_live += 1;
                state.enqueued_front += 1;
            }
        }
        self.cond.notify_all();
    }

    /// Claims and executes one elt, if any is available to this thread.
    ///
    /// With `blocking`, parks on the condvar until there is a claim, the
    /// thread is enabled, and the scheduler is not terminating. Without it,
    /// returns `false` immediately in those cases (the polling mode used by
    /// helping waiters).
    ///
    /// Returns `true` iff an elt was executed.
    ///
    /// # Panics
    ///
    /// Panics if `thread_index` is out of range. A panic from the task body
    /// is re-thrown after completion bookkeeping has run.
    pub fn work(&self, thread_index: usize, blocking: bool) -> bool {
        assert!(thread_index < self.threads, "thread_index out of range");

        let mut state = self.lock_state();
        while !state.terminate && (state.ring.is_empty() || !state.enabled[thread_index]) {
            if !blocking {
                return false;
            }
            state = self.cond.wait(state).expect("scheduler mutex poisoned");
        }
        if state.terminate {
            return false;
        }

        // Claim under the lock. Front-inserted work preempts the back stack.
        let from_front = state.front_live > 0;
        let task = {
            let slot = if from_front {
                state.ring.front()
            } else {
                state.ring.back()
            };
            Arc::clone(slot.expect("claimable ring entry"))
        };
        let elt = task.claim();
        if elt == 0 {
            // No claims left; drop out of the logical queue. Other elts may
            // still be mid-execution on other threads.
            if from_front {
                state.ring.pop_front();
                state.front_live -= 1;
            } else {
                state.ring.pop_back();
            }
        }
        drop(state);

        self.metrics
            .worker(thread_index)
            .claims
            .fetch_add(1, Ordering::Relaxed);

        // Run the body unlocked. Completion bookkeeping must happen even if
        // the body panics, or waiters on the task's event would hang.
        let thread_count = self.num_enabled.load(Ordering::Relaxed);
        let body = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            task.run_elt(thread_index, thread_count, elt);
        }));

        if task.finish_elt(thread_index, thread_count) {
            self.metrics
                .worker(thread_index)
                .tasks_finished
                .fetch_add(1, Ordering::Relaxed);
        }

        if let Err(payload) = body {
            panic::resume_unwind(payload);
        }
        true
    }

    /// Blocks until `event` triggers.
    ///
    /// Pairs the waiter's arrival with the submission-time increments: the
    /// event triggers only once every referencing task is done *and* this
    /// waiter has joined.
    ///
    /// A [`Caller::Worker`] drains the queue with non-blocking `work` calls
    /// while it waits. This is required correctness behavior, not an
    /// optimization: without it, every worker could block on events whose
    /// satisfying tasks are still queued, with no thread left to run them.
    /// [`Caller::External`] threads, and disabled workers, block on the
    /// event itself.
    pub fn wait(&self, caller: Caller, event: &Event) {
        event.dec();
        match caller {
            Caller::External => event.wait_blocking(),
            Caller::Worker(thread_index) if !self.is_enabled(thread_index) => {
                event.wait_blocking()
            }
            Caller::Worker(thread_index) => {
                let backoff = Backoff::new();
                while !event.triggered() {
                    self.metrics
                        .worker(thread_index)
                        .help_polls
                        .fetch_add(1, Ordering::Relaxed);
                    if self.work(thread_index, false) {
                        backoff.reset();
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    /// Per-thread entry point; the owning thread pool drives this until
    /// shutdown. Exits once [`terminate`](Self::terminate) is observed.
    pub fn run(&self, thread_index: usize) {
        while self.work(thread_index, true) {}
    }

    /// Stops new claims and broadcasts so every blocked `work` wakes and
    /// exits. In-flight elts finish; queued, unclaimed tasks keep their
    /// counters untouched. Callers that need a clean drain must stop
    /// submitting and wait for outstanding events first.
    pub fn terminate(&self) {
        let mut state = self.lock_state();
        state.terminate = true;
        self.terminating.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    /// Whether `terminate` has been called.
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// Aggregated counters. See [`MetricsSnapshot`] for consistency caveats.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        {
            let state = self.lock_state();
            snapshot.enqueued_back = state.enqueued_back;
            snapshot.enqueued_front = state.enqueued_front;
            snapshot.ring_grows = state.ring.grows();
            snapshot.ring_capacity = state.ring.capacity() as u64;
        }
        self.metrics.fold(&mut snapshot);
        snapshot
    }
}
