//! End-to-end scheduler scenarios: multi-worker claim accounting, fan-in
//! ordering, dependency waits from both worker and external threads, and
//! shutdown behavior.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use worksched::{Caller, Event, QueueEnd, SchedulerConfig, Task, TaskScheduler, WorkerPool};

fn config(threads: usize) -> SchedulerConfig {
    SchedulerConfig {
        threads,
        initial_capacity: 4,
        pin_threads: false,
    }
}

/// Every submitted elt is claimed exactly once, even when submission
/// outruns the initial queue capacity and forces growth.
#[test]
fn every_elt_claimed_exactly_once_across_growth() {
    const TASKS: usize = 64;
    const ELTS: u32 = 3;

    let pool = WorkerPool::new(config(4));
    let scheduler = pool.scheduler();

    // Park the workers so the queue genuinely fills and doubles.
    for i in 0..4 {
        scheduler.set_enabled(i, false);
    }

    let event = Arc::new(Event::new());
    let claims: Arc<Vec<AtomicU32>> = Arc::new(
        (0..TASKS * ELTS as usize)
            .map(|_| AtomicU32::new(0))
            .collect(),
    );

    for task_id in 0..TASKS {
        let claims = Arc::clone(&claims);
        pool.add(
            QueueEnd::Back,
            Arc::new(
                Task::new("slice", ELTS, move |args| {
                    claims[task_id * ELTS as usize + args.elt as usize]
                        .fetch_add(1, Ordering::Relaxed);
                })
                .with_event(Arc::clone(&event)),
            ),
        );
    }
    assert!(
        scheduler.metrics().ring_grows >= 1,
        "64 queued tasks must outgrow capacity 4"
    );

    for i in 0..4 {
        scheduler.set_enabled(i, true);
    }
    pool.wait(&event);

    for (i, c) in claims.iter().enumerate() {
        assert_eq!(c.load(Ordering::Relaxed), 1, "elt slot {i} claim count");
    }
    let snapshot = pool.shutdown();
    assert_eq!(snapshot.claims, (TASKS * ELTS as usize) as u64);
    assert_eq!(snapshot.tasks_finished, TASKS as u64);
}

/// One task with elts = 4 on two workers: all four elts run exactly once,
/// the fan-in fires exactly once after the fourth, and the waiter unblocks
/// only after that.
#[test]
fn fanin_fires_once_after_all_subunits_then_waiter_unblocks() {
    let pool = WorkerPool::new(config(2));
    let event = Arc::new(Event::new());
    let ran = Arc::new(AtomicU32::new(0));
    let fired = Arc::new(AtomicU32::new(0));

    let (r, r_in_complete, f) = (Arc::clone(&ran), Arc::clone(&ran), Arc::clone(&fired));
    pool.add(
        QueueEnd::Back,
        Arc::new(
            Task::new("tile", 4, move |_| {
                r.fetch_add(1, Ordering::Relaxed);
            })
            .with_complete(move |_| {
                assert_eq!(
                    r_in_complete.load(Ordering::Relaxed),
                    4,
                    "fan-in ran before all elts"
                );
                f.fetch_add(1, Ordering::Relaxed);
            })
            .with_event(Arc::clone(&event)),
        ),
    );

    pool.wait(&event);
    assert_eq!(ran.load(Ordering::Relaxed), 4);
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    pool.shutdown();
}

/// N tasks fanning into one event, submitted before the wait starts.
#[test]
fn add_then_wait_returns_after_all_tasks() {
    const N: usize = 16;
    let pool = WorkerPool::new(config(3));
    let event = Arc::new(Event::new());
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..N {
        let d = Arc::clone(&done);
        pool.add(
            QueueEnd::Back,
            Arc::new(
                Task::new("n-task", 1, move |_| {
                    d.fetch_add(1, Ordering::Relaxed);
                })
                .with_event(Arc::clone(&event)),
            ),
        );
    }

    pool.wait(&event);
    assert_eq!(done.load(Ordering::Relaxed), N);
    pool.shutdown();
}

/// The waiter arrives while most of the tasks have not been submitted yet.
/// Workers are parked so the first task cannot complete early; submissions
/// racing the established waiter must never let it observe a spuriously
/// triggered event.
#[test]
fn wait_started_before_remaining_adds_sees_all_completions() {
    const N: usize = 12;
    let pool = WorkerPool::new(config(2));
    let scheduler = Arc::clone(pool.scheduler());
    scheduler.set_enabled(0, false);
    scheduler.set_enabled(1, false);

    let event = Arc::new(Event::new());
    let done = Arc::new(AtomicUsize::new(0));

    let make_task = |done: &Arc<AtomicUsize>, event: &Arc<Event>| {
        let d = Arc::clone(done);
        Arc::new(
            Task::new("dep", 1, move |_| {
                d.fetch_add(1, Ordering::Relaxed);
            })
            .with_event(Arc::clone(event)),
        )
    };

    // One referencing task keeps the event armed for the waiter.
    scheduler.add(QueueEnd::Back, make_task(&done, &event));

    let waiter = {
        let scheduler = Arc::clone(&scheduler);
        let event = Arc::clone(&event);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            scheduler.wait(Caller::External, &event);
            done.load(Ordering::Relaxed)
        })
    };

    for _ in 1..N {
        scheduler.add(QueueEnd::Back, make_task(&done, &event));
    }
    scheduler.set_enabled(0, true);
    scheduler.set_enabled(1, true);

    let observed = waiter.join().unwrap();
    assert_eq!(observed, N, "waiter unblocked before all tasks completed");
    pool.shutdown();
}

/// Multiple waiters on one event all unblock, and only after every task.
#[test]
fn multiple_waiters_all_unblock_after_completion() {
    const N: usize = 8;
    let pool = WorkerPool::new(config(2));
    let event = Arc::new(Event::new());
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..N {
        let d = Arc::clone(&done);
        pool.add(
            QueueEnd::Back,
            Arc::new(
                Task::new("shared", 1, move |_| {
                    d.fetch_add(1, Ordering::Relaxed);
                })
                .with_event(Arc::clone(&event)),
            ),
        );
    }

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let scheduler = Arc::clone(pool.scheduler());
            let event = Arc::clone(&event);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                scheduler.wait(Caller::External, &event);
                done.load(Ordering::Relaxed)
            })
        })
        .collect();

    for w in waiters {
        assert_eq!(w.join().unwrap(), N);
    }
    pool.shutdown();
}

/// A single worker that waits on sub-tasks from inside a task body must
/// drain them itself. Without help-while-waiting this test deadlocks.
#[test]
fn worker_waiting_on_subtasks_helps_drain_the_queue() {
    let pool = WorkerPool::new(config(1));
    let scheduler = Arc::clone(pool.scheduler());
    let frame_done = Arc::new(Event::new());
    let children_run = Arc::new(AtomicUsize::new(0));

    let (sched, children) = (Arc::clone(&scheduler), Arc::clone(&children_run));
    pool.add(
        QueueEnd::Back,
        Arc::new(
            Task::new("parent", 1, move |args| {
                let subtasks_done = Arc::new(Event::new());
                for _ in 0..4 {
                    let c = Arc::clone(&children);
                    // Continuations go to the front so they run ahead of
                    // anything else queued behind the parent.
                    sched.add(
                        QueueEnd::Front,
                        Arc::new(
                            Task::new("child", 1, move |_| {
                                c.fetch_add(1, Ordering::Relaxed);
                            })
                            .with_event(Arc::clone(&subtasks_done)),
                        ),
                    );
                }
                sched.wait(Caller::Worker(args.thread_index), &subtasks_done);
                assert_eq!(children.load(Ordering::Relaxed), 4);
            })
            .with_event(Arc::clone(&frame_done)),
        ),
    );

    pool.wait(&frame_done);
    assert_eq!(children_run.load(Ordering::Relaxed), 4);
    pool.shutdown();
}

/// Terminate with tasks still queued: every run loop exits (including
/// disabled workers parked on the condvar) and the unclaimed tasks keep
/// their counters untouched.
#[test]
fn terminate_with_queued_tasks_exits_workers_and_preserves_counters() {
    let pool = WorkerPool::new(config(2));
    let scheduler = pool.scheduler();
    scheduler.set_enabled(0, false);
    scheduler.set_enabled(1, false);

    let tasks: Vec<Arc<Task>> = (0..3)
        .map(|_| {
            Arc::new(Task::new("never-run", 2, |_| {
                panic!("claimed after terminate");
            }))
        })
        .collect();
    for t in &tasks {
        pool.add(QueueEnd::Back, Arc::clone(t));
    }

    // shutdown() joining proves every blocked run() loop exited.
    let snapshot = pool.shutdown();
    assert_eq!(snapshot.claims, 0);
    for t in &tasks {
        assert_eq!(t.started(), 2);
        assert_eq!(t.completed(), 2);
        assert!(!t.is_completed());
    }
}

/// The thread count handed to task bodies tracks the enabled set, not the
/// pool size.
#[test]
fn task_args_report_enabled_thread_count() {
    let scheduler = TaskScheduler::new(config(3));
    scheduler.set_enabled(2, false);

    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    scheduler.add(
        QueueEnd::Back,
        Arc::new(Task::new("count-check", 1, move |args| {
            s.store(args.thread_count, Ordering::Relaxed);
        })),
    );

    assert!(scheduler.work(0, false));
    assert_eq!(seen.load(Ordering::Relaxed), 2);
}
