//! Cooperative task scheduling engine.
//!
//! A shared-memory, multi-threaded scheduler that parallelizes rendering and
//! compute work across CPU cores within one process:
//!
//! - [`Task`]/[`Event`]: the work descriptor and the shared completion
//!   counter it fans into.
//! - [`TaskScheduler`]: growable double-ended task queue with two-priority
//!   insertion, per-thread enable gating, and a help-while-waiting `wait`.
//! - [`WorkerPool`]: owns the OS threads that drive the per-thread
//!   [`run`](TaskScheduler::run) loop.
//!
//! Data flow: a producer builds a [`Task`] (optionally tied to an
//! [`Event`]), submits it with [`add`](TaskScheduler::add); idle workers
//! claim elts and execute bodies outside the lock; completion decrements
//! propagate into the event; a waiter calls [`wait`](TaskScheduler::wait)
//! and, if it is itself a worker, helps drain the queue until the event
//! triggers.

mod executor;
mod metrics;
mod pool;
mod ring;
mod task;

pub use executor::{Caller, QueueEnd, SchedulerConfig, TaskScheduler};
pub use metrics::MetricsSnapshot;
pub use pool::WorkerPool;
pub use task::{CompleteArgs, Event, Task, TaskArgs};
