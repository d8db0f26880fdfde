//!
//! station-queue - Bounded Lock-Free MPMC Queue
//!
//! A multi-producer/multi-consumer FIFO over a ring of `2^k` slots. Slot
//! ownership is serialised through a pair of per-slot generation counters
//! (`push_cnt`/`pop_cnt`) rather than a single sequence number, so the turn
//! invariant (`push_cnt[i] == pop_cnt[i] == r` admits pushers, `push_cnt[i]
//! == r + 1` admits poppers) is explicit at every call site instead of
//! being derived from one field.
//!
//! `push`/`pop` never block, never allocate, and never fail spuriously on a
//! non-full/non-empty queue: a failed compare-exchange means another
//! producer (or consumer) won the slot for this turn, so the caller simply
//! reloads the global counter and retries.
//!

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use station_core::StationError;

/// Largest `capacity_log2` this queue accepts. The per-slot and global
/// counters are `u64`; 32 leaves ample headroom between turns without
/// risking counter overflow across a long-running process.
const MAX_CAPACITY_LOG2: u32 = 32;

/// A bounded lock-free MPMC queue of fixed-size elements.
///
/// `T` must be `Copy + Default`: elements are stored by value in a fixed
/// ring, and `Default` models the C original's "null value pointer ⇒ slot
/// zeroed" contract (`push(None)` stores `T::default()`).
pub struct Queue<T> {
    buffer: Box<[UnsafeCell<T>]>,
    mask: u64,
    shift: u32,
    push_cnt: Box<[AtomicU64]>,
    pop_cnt: Box<[AtomicU64]>,
    total_push: AtomicU64,
    total_pop: AtomicU64,
}

// SAFETY: slot ownership at any instant belongs to exactly one role (pusher
// or popper), enforced by the push_cnt/pop_cnt turn protocol below; no two
// threads ever read or write the same `UnsafeCell<T>` slot concurrently.
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T: Copy + Default> Queue<T> {
    /// Creates a queue with capacity `2^capacity_log2`.
    ///
    /// Fails if `capacity_log2` exceeds the counter width.
    pub fn create(capacity_log2: u32) -> Result<Self, StationError> {
        if capacity_log2 > MAX_CAPACITY_LOG2 {
            return Err(StationError::InvalidArgument(format!(
                "capacity_log2 {capacity_log2} exceeds counter width {MAX_CAPACITY_LOG2}"
            )));
        }

        let capacity = 1usize << capacity_log2;
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let push_cnt = (0..capacity)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let pop_cnt = (0..capacity)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        tracing::debug!(capacity, element = std::any::type_name::<T>(), "queue created");

        Ok(Self {
            buffer,
            mask: capacity as u64 - 1,
            shift: capacity_log2,
            push_cnt,
            pop_cnt,
            total_push: AtomicU64::new(0),
            total_pop: AtomicU64::new(0),
        })
    }

    /// Queue capacity (`2^capacity_log2`).
    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    /// Size in bytes of one element.
    pub fn element_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    /// Pushes `value`, or a zeroed/default element if `value` is `None`.
    /// Returns `false` if the queue is full.
    pub fn push(&self, value: Option<T>) -> bool {
        loop {
            let g = self.total_push.load(Ordering::Relaxed);
            let i = (g & self.mask) as usize;
            let r = g >> self.shift;

            let push_c = self.push_cnt[i].load(Ordering::Acquire);
            let pop_c = self.pop_cnt[i].load(Ordering::Relaxed);

            if push_c != pop_c {
                return false; // full: this slot's previous turn hasn't been popped yet
            }
            if push_c != r {
                continue; // stale view of total_push; reload and retry
            }

            if self
                .total_push
                .compare_exchange_weak(g, g + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: the CAS above is this queue's sole admission gate for
                // slot `i` at turn `r`; no other pusher can be writing it.
                unsafe {
                    *self.buffer[i].get() = value.unwrap_or_default();
                }
                self.push_cnt[i].store(r + 1, Ordering::Release);
                return true;
            }
        }
    }

    /// Pops one element into `Some(value)`, or returns `None` if the queue
    /// is empty.
    pub fn pop(&self) -> Option<T> {
        loop {
            let g = self.total_pop.load(Ordering::Relaxed);
            let i = (g & self.mask) as usize;
            let r = g >> self.shift;

            let pop_c = self.pop_cnt[i].load(Ordering::Acquire);
            let push_c = self.push_cnt[i].load(Ordering::Relaxed);

            if pop_c == push_c {
                return None; // empty: nothing published for this turn yet
            }
            if pop_c != r {
                continue; // stale view of total_pop; reload and retry
            }

            if self
                .total_pop
                .compare_exchange_weak(g, g + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: mirror of push's admission gate, for the pop role.
                let value = unsafe { *self.buffer[i].get() };
                self.pop_cnt[i].store(r + 1, Ordering::Release);
                return Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn round_trip_single_threaded() {
        let q: Queue<i32> = Queue::create(2).unwrap();
        assert!(q.push(Some(10)));
        assert!(q.push(Some(20)));
        assert!(q.push(Some(30)));
        assert!(q.push(Some(40)));

        assert_eq!(q.pop(), Some(10));
        assert_eq!(q.pop(), Some(20));
        assert_eq!(q.pop(), Some(30));
        assert_eq!(q.pop(), Some(40));
        assert_eq!(q.pop(), None);

        assert!(q.push(Some(50)));
        assert_eq!(q.pop(), Some(50));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn capacity_one_boundary() {
        let q: Queue<u8> = Queue::create(0).unwrap();
        assert_eq!(q.capacity(), 1);
        assert!(q.push(Some(1)));
        assert!(!q.push(Some(2))); // full

        for _ in 0..10 {
            assert_eq!(q.pop(), Some(1));
            assert!(q.push(Some(1)));
            assert!(!q.push(Some(2)));
        }
    }

    #[test]
    fn null_value_zero_fills() {
        let q: Queue<i64> = Queue::create(1).unwrap();
        assert!(q.push(None));
        assert_eq!(q.pop(), Some(0));
    }

    #[test]
    fn failing_push_leaves_state_unchanged() {
        let q: Queue<i32> = Queue::create(0).unwrap();
        assert!(q.push(Some(7)));
        assert!(!q.push(Some(8)));
        assert_eq!(q.pop(), Some(7));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn mpmc_stress_no_loss_no_duplication() {
        use std::sync::atomic::AtomicUsize;

        const PRODUCERS: usize = 2;
        const CONSUMERS: usize = 2;
        const PER_PRODUCER: u64 = 20_000;
        const TOTAL: u64 = PRODUCERS as u64 * PER_PRODUCER;

        let q: Arc<Queue<u64>> = Arc::new(Queue::create(6).unwrap());
        let producers_done = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                let producers_done = Arc::clone(&producers_done);
                thread::spawn(move || {
                    let base = p as u64 * PER_PRODUCER;
                    for i in 0..PER_PRODUCER {
                        let value = base + i;
                        while !q.push(Some(value)) {
                            thread::yield_now();
                        }
                    }
                    producers_done.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let q = Arc::clone(&q);
                let producers_done = Arc::clone(&producers_done);
                thread::spawn(move || {
                    let mut bag = Vec::new();
                    loop {
                        match q.pop() {
                            Some(v) => bag.push(v),
                            None => {
                                if producers_done.load(Ordering::Relaxed) == PRODUCERS {
                                    // producers are done; one more empty pop
                                    // after this confirms the queue is drained
                                    match q.pop() {
                                        Some(v) => bag.push(v),
                                        None => break,
                                    }
                                } else {
                                    thread::yield_now();
                                }
                            }
                        }
                    }
                    bag
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        let bags: Vec<Vec<u64>> = consumers.into_iter().map(|c| c.join().unwrap()).collect();

        let mut all: Vec<u64> = bags.into_iter().flatten().collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..TOTAL).collect();
        assert_eq!(all, expected);
    }
}
