//! Scheduler observability counters.
//!
//! Per-worker counters live in [`CachePadded`] slots so adjacent workers never
//! share a cache line; updates are relaxed single increments on the claim
//! path. Queue-level counters (enqueues per end, ring growths) are maintained
//! under the queue lock and folded in when a snapshot is taken.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// One worker's counters. Relaxed ordering throughout: these are statistics,
/// not synchronization.
#[derive(Default)]
pub(crate) struct WorkerCounters {
    /// Elts claimed by this worker.
    pub(crate) claims: AtomicU64,
    /// Tasks whose final completion this worker observed.
    pub(crate) tasks_finished: AtomicU64,
    /// Non-blocking queue polls issued while helping during a wait.
    pub(crate) help_polls: AtomicU64,
}

pub(crate) struct Metrics {
    workers: Vec<CachePadded<WorkerCounters>>,
}

impl Metrics {
    pub(crate) fn new(threads: usize) -> Self {
        Self {
            workers: (0..threads)
                .map(|_| CachePadded::new(WorkerCounters::default()))
                .collect(),
        }
    }

    pub(crate) fn worker(&self, thread_index: usize) -> &WorkerCounters {
        &self.workers[thread_index]
    }

    pub(crate) fn fold(&self, snapshot: &mut MetricsSnapshot) {
        for w in &self.workers {
            snapshot.claims += w.claims.load(Ordering::Relaxed);
            snapshot.tasks_finished += w.tasks_finished.load(Ordering::Relaxed);
            snapshot.help_polls += w.help_polls.load(Ordering::Relaxed);
        }
    }
}

/// Aggregated scheduler counters at a point in time.
///
/// Taken while workers may still be running, the numbers are individually
/// accurate but not mutually consistent; take snapshots after a drain when
/// exact totals matter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total elts claimed.
    pub claims: u64,
    /// Tasks fully completed (fan-in fired).
    pub tasks_finished: u64,
    /// Help-while-waiting queue polls.
    pub help_polls: u64,
    /// Tasks enqueued at the back end.
    pub enqueued_back: u64,
    /// Tasks enqueued at the front end.
    pub enqueued_front: u64,
    /// Ring buffer doublings.
    pub ring_grows: u64,
    /// Current ring capacity in slots.
    pub ring_capacity: u64,
}
