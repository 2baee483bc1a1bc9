//! Worker thread pool driving a [`TaskScheduler`].
//!
//! The scheduler itself never creates threads; this pool owns them. Each
//! worker is a named OS thread running [`TaskScheduler::run`] until
//! terminate. Shutdown terminates, joins every worker, and re-throws the
//! first captured worker panic on the caller.

use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::executor::{Caller, QueueEnd, SchedulerConfig, TaskScheduler};
use super::metrics::MetricsSnapshot;
use super::task::{Event, Task};

/// Fixed pool of OS worker threads cooperatively executing scheduler work.
pub struct WorkerPool {
    scheduler: Arc<TaskScheduler>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates the scheduler and starts `config.threads` workers. Workers
    /// park until work is submitted.
    pub fn new(config: SchedulerConfig) -> Self {
        config.validate();
        let scheduler = Arc::new(TaskScheduler::new(config));

        let threads = (0..config.threads)
            .map(|thread_index| {
                let scheduler = Arc::clone(&scheduler);
                thread::Builder::new()
                    .name(format!("sched-worker-{thread_index}"))
                    .spawn(move || {
                        #[cfg(feature = "affinity")]
                        if config.pin_threads {
                            pin_current_thread(thread_index);
                        }
                        scheduler.run(thread_index);
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { scheduler, threads }
    }

    /// The scheduler the workers drive. Clone the `Arc` to submit from
    /// other threads or from inside task bodies.
    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Submits a task. Convenience for `scheduler().add(...)`.
    pub fn add(&self, queue_end: QueueEnd, task: Arc<Task>) {
        self.scheduler.add(queue_end, task);
    }

    /// Blocks the calling (non-worker) thread until `event` triggers.
    pub fn wait(&self, event: &Event) {
        self.scheduler.wait(Caller::External, event);
    }

    /// Terminates the scheduler, joins all workers, and returns final
    /// metrics.
    ///
    /// # Panics
    ///
    /// If any worker panicked (a task body panic is re-thrown on its
    /// worker), the first captured payload is re-thrown here after every
    /// thread has been joined.
    pub fn shutdown(mut self) -> MetricsSnapshot {
        self.scheduler.terminate();

        let mut first_panic = None;
        for handle in self.threads.drain(..) {
            if let Err(payload) = handle.join() {
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }

        let snapshot = self.scheduler.metrics();
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        snapshot
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropped without shutdown(): still terminate and join so no worker
        // outlives the pool. Panics are discarded on this path.
        if !self.threads.is_empty() {
            self.scheduler.terminate();
            for handle in self.threads.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(feature = "affinity")]
fn pin_current_thread(thread_index: usize) {
    let cores = match core_affinity::get_core_ids() {
        Some(v) if !v.is_empty() => v,
        _ => {
            eprintln!(
                "WARN: Failed to get core IDs for worker {}, skipping affinity",
                thread_index
            );
            return;
        }
    };
    let core = cores[thread_index % cores.len()];
    if !core_affinity::set_for_current(core) {
        eprintln!(
            "WARN: Failed to pin worker {} to core {:?}",
            thread_index, core.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool_config(threads: usize) -> SchedulerConfig {
        SchedulerConfig {
            threads,
            initial_capacity: 8,
            pin_threads: false,
        }
    }

    #[test]
    fn pool_runs_submitted_tasks() {
        let pool = WorkerPool::new(pool_config(2));
        let event = Arc::new(Event::new());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let c = Arc::clone(&counter);
            pool.add(
                QueueEnd::Back,
                Arc::new(
                    Task::new("count", 1, move |_| {
                        c.fetch_add(1, Ordering::Relaxed);
                    })
                    .with_event(Arc::clone(&event)),
                ),
            );
        }
        pool.wait(&event);
        assert_eq!(counter.load(Ordering::Relaxed), 50);

        let snapshot = pool.shutdown();
        assert_eq!(snapshot.claims, 50);
        assert_eq!(snapshot.tasks_finished, 50);
    }

    #[test]
    fn shutdown_with_no_work_returns() {
        let pool = WorkerPool::new(pool_config(4));
        let snapshot = pool.shutdown();
        assert_eq!(snapshot.claims, 0);
    }

    #[test]
    fn drop_without_shutdown_joins_workers() {
        let pool = WorkerPool::new(pool_config(2));
        drop(pool);
    }

    #[test]
    fn shutdown_rethrows_task_panic() {
        let result = panic::catch_unwind(|| {
            let pool = WorkerPool::new(pool_config(2));
            let event = Arc::new(Event::new());
            pool.add(
                QueueEnd::Back,
                Arc::new(
                    Task::new("boom", 1, |_| panic!("intentional test panic"))
                        .with_event(Arc::clone(&event)),
                ),
            );
            // The event still triggers: completion bookkeeping survives the
            // panic, so the waiter is not stranded.
            pool.wait(&event);
            pool.shutdown()
        });
        assert!(result.is_err(), "pool should re-throw the worker panic");
    }
}
