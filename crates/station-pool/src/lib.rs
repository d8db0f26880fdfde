//!
//! station-pool - Ping/pong Worker Pool
//!
//! Workers are spawned once, at [`Pool::create`], and sit parked on a ping
//! flag between assignments rather than pulling from a work queue. Each
//! [`Pool::execute`] call hands every worker the same task function and a
//! shared cursor (`done_tasks`): workers race to claim batches via
//! `fetch_add` until the cursor passes `num_tasks`, then the last one to
//! finish flips the pong flag (or runs the completion callback) and clears
//! `busy`.
//!
//! The ping/pong flags use a sense-reversing protocol: each round both the
//! pool and every worker flip a local boolean, so a flag transitioning to
//! the new sense (rather than to a fixed value) is what each side waits on.
//! This avoids a missed-wakeup race between a worker finishing round N and
//! the pool starting round N+1 before the worker has reset anything.
//!
//! `num_threads == 0` degrades to running every task inline on the calling
//! thread; no threads are spawned and `execute` never blocks.

mod pool;

pub use pool::Pool;

use station_core::{TaskIdx, ThreadIdx};

/// Per-task function: invoked once per task index, on whichever worker
/// thread claimed that task (`0` for the inline `num_threads == 0` case).
pub trait TaskFn: Fn(TaskIdx, ThreadIdx) + Sync {}
impl<F: Fn(TaskIdx, ThreadIdx) + Sync> TaskFn for F {}

/// Completion callback: invoked once, by whichever thread finishes last.
/// When absent, `execute` blocks the caller until the assignment completes.
pub trait DoneFn: Fn(ThreadIdx) + Sync {}
impl<F: Fn(ThreadIdx) + Sync> DoneFn for F {}
