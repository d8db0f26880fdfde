//!
//! Index types for concurrent processing
//!
//! Mirrors `station_task_idx_t`/`station_thread_idx_t` from the original
//! concurrent-processing header: a task index is a 32-bit count, a thread
//! index is 16-bit (a pool realistically never spans more than 65535
//! threads).
//!

/// Index of a concurrent task within one assignment.
pub type TaskIdx = u32;
/// Number of concurrent tasks in one assignment.
pub type TasksNumber = u32;

/// Index of a worker thread within a pool.
pub type ThreadIdx = u16;
/// Number of worker threads in a pool.
pub type ThreadsNumber = u16;
