//! Cooperative multi-threaded task scheduler.
//!
//! ## Scope
//! This crate is the task-scheduling core used to spread rendering/compute
//! work across the cores of one process: a lock-protected growable deque of
//! pending claims, two-priority insertion, atomic fan-out/fan-in completion
//! counting through shared events, runtime enable/disable of worker
//! participation, and dependency waits that help drain the queue instead of
//! idling.
//!
//! ## Key invariants
//! - Every submitted elt is claimed exactly once; the fan-in closure and
//!   event decrement fire exactly once per task.
//! - The queue lock is never held while a task body runs.
//! - A worker blocked in `wait` keeps executing other ready tasks, so the
//!   pool cannot deadlock on queued dependencies.
//! - `terminate` stops new claims only; it never fabricates completions.
//!
//! ## Typical flow
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use worksched::{Event, QueueEnd, SchedulerConfig, Task, WorkerPool};
//!
//! let pool = WorkerPool::new(SchedulerConfig {
//!     threads: 2,
//!     ..SchedulerConfig::default()
//! });
//!
//! let frame_done = Arc::new(Event::new());
//! let tiles = Arc::new(AtomicU32::new(0));
//!
//! let t = Arc::clone(&tiles);
//! pool.add(
//!     QueueEnd::Back,
//!     Arc::new(
//!         Task::new("render-tiles", 8, move |args| {
//!             // args.elt is the tile index, 7 ..= 0
//!             t.fetch_add(1 << args.elt, Ordering::Relaxed);
//!         })
//!         .with_event(Arc::clone(&frame_done)),
//!     ),
//! );
//!
//! pool.wait(&frame_done);
//! assert_eq!(tiles.load(Ordering::Relaxed), 0xFF);
//! # pool.shutdown();
//! ```
//!
//! Out of scope: distributed scheduling, preemption, task cancellation after
//! submission, and the renderers/loaders that submit the work.

pub mod scheduler;

pub use scheduler::{
    Caller, CompleteArgs, Event, MetricsSnapshot, QueueEnd, SchedulerConfig, Task, TaskArgs,
    TaskScheduler, WorkerPool,
};
