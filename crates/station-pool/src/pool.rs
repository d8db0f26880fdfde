use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use station_core::{StationError, TaskIdx, ThreadIdx, ThreadsNumber};

/// An in-flight assignment, published to every worker by a release store
/// to `ping_flag` and read back by an acquire load of the same flag.
struct Assignment {
    pfunc: *const (dyn Fn(TaskIdx, ThreadIdx) + Sync),
    callback: Option<*const (dyn Fn(ThreadIdx) + Sync)>,
    num_tasks: u32,
    batch_size: u32,
    use_pong_cnd: bool,
}

// SAFETY: the raw pointers above are only ever dereferenced by a worker
// thread between observing `ping_flag` at the new sense (an acquire load
// paired with the execute()-side release store that published them) and
// the pool's `execute` observing `pong_flag` at the matching sense, which
// happens-after every worker has returned from the assignment. No access
// to `pfunc`/`callback` can outlive that window.
unsafe impl Send for Assignment {}

struct Shared {
    num_threads: ThreadsNumber,
    busy: AtomicBool,

    ping_flag: AtomicBool,
    pong_flag: AtomicBool,
    ping_sense: AtomicBool,
    pong_sense: AtomicBool,

    use_cnd: bool,
    ping_mutex: Mutex<()>,
    ping_cnd: Condvar,
    pong_mutex: Mutex<()>,
    pong_cnd: Condvar,

    terminate: AtomicBool,
    assignment: UnsafeCell<Option<Assignment>>,
    done_tasks: AtomicU32,
    thread_counter: AtomicU16,
}

// SAFETY: `assignment` is written by `execute` before the release store to
// `ping_flag`, and read by workers only after the matching acquire load;
// `execute` does not write it again until it has observed `pong_flag` at
// the new sense, i.e. after every worker is done reading it.
unsafe impl Sync for Shared {}

impl Shared {
    fn wait_ping(&self, sense: bool) {
        if self.use_cnd {
            let mut guard = self.ping_mutex.lock().unwrap();
            while self.ping_flag.load(Ordering::Acquire) != sense {
                guard = self.ping_cnd.wait(guard).unwrap();
            }
        } else {
            while self.ping_flag.load(Ordering::Acquire) != sense {
                std::hint::spin_loop();
            }
        }
    }

    fn wait_pong(&self, sense: bool, use_cnd: bool) {
        if use_cnd {
            let mut guard = self.pong_mutex.lock().unwrap();
            while self.pong_flag.load(Ordering::Acquire) != sense {
                guard = self.pong_cnd.wait(guard).unwrap();
            }
        } else {
            while self.pong_flag.load(Ordering::Acquire) != sense {
                std::hint::spin_loop();
            }
        }
    }

    fn signal_ping(&self, sense: bool) {
        self.ping_flag.store(sense, Ordering::Release);
        if self.use_cnd {
            let _guard = self.ping_mutex.lock().unwrap();
            self.ping_cnd.notify_all();
        }
    }

    fn signal_pong(&self, sense: bool, use_cnd: bool) {
        self.pong_flag.store(sense, Ordering::Release);
        if use_cnd {
            let _guard = self.pong_mutex.lock().unwrap();
            self.pong_cnd.notify_all();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, thread_idx: ThreadIdx) {
    let last = shared.num_threads - 1;
    let mut ping_sense = false;
    let mut pong_sense = false;

    loop {
        ping_sense = !ping_sense;
        pong_sense = !pong_sense;

        shared.wait_ping(ping_sense);

        if shared.terminate.load(Ordering::Acquire) {
            break;
        }

        // SAFETY: see the Sync justification on `Shared`: the assignment
        // was published before this round's ping and is stable until this
        // worker reports pong.
        let assignment_ptr = unsafe { &*shared.assignment.get() };
        let assignment = assignment_ptr
            .as_ref()
            .expect("assignment published before ping");

        let mut task_idx = shared
            .done_tasks
            .fetch_add(assignment.batch_size, Ordering::Relaxed);
        let mut remaining = assignment.batch_size;

        while task_idx < assignment.num_tasks {
            // SAFETY: see the Send justification on `Assignment`.
            let pfunc = unsafe { &*assignment.pfunc };
            pfunc(task_idx, thread_idx);
            remaining -= 1;

            if remaining > 0 {
                task_idx += 1;
            } else {
                task_idx = shared
                    .done_tasks
                    .fetch_add(assignment.batch_size, Ordering::Relaxed);
                remaining = assignment.batch_size;
            }
        }

        if shared.thread_counter.fetch_add(1, Ordering::AcqRel) == last {
            shared.signal_pong(pong_sense, assignment.use_pong_cnd);

            if let Some(cb_ptr) = assignment.callback {
                // SAFETY: see the Send justification on `Assignment`.
                let callback = unsafe { &*cb_ptr };
                callback(thread_idx);
            }

            shared.busy.store(false, Ordering::Release);
        }
    }
}

/// A fixed-size ping/pong worker pool.
pub struct Pool {
    shared: Option<Arc<Shared>>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Spawns `num_threads` persistent worker threads. `busy_wait` selects
    /// spin-waiting over condition-variable waiting for both the ping and
    /// pong handoffs.
    ///
    /// `num_threads == 0` is a valid, degenerate pool: no threads are
    /// spawned and [`Pool::execute`] runs every task inline.
    pub fn create(num_threads: ThreadsNumber, busy_wait: bool) -> Result<Self, StationError> {
        if num_threads == 0 {
            return Ok(Self {
                shared: None,
                handles: Vec::new(),
            });
        }

        let shared = Arc::new(Shared {
            num_threads,
            busy: AtomicBool::new(false),
            ping_flag: AtomicBool::new(false),
            pong_flag: AtomicBool::new(false),
            ping_sense: AtomicBool::new(false),
            pong_sense: AtomicBool::new(false),
            use_cnd: !busy_wait,
            ping_mutex: Mutex::new(()),
            ping_cnd: Condvar::new(),
            pong_mutex: Mutex::new(()),
            pong_cnd: Condvar::new(),
            terminate: AtomicBool::new(false),
            assignment: UnsafeCell::new(None),
            done_tasks: AtomicU32::new(0),
            thread_counter: AtomicU16::new(0),
        });

        let mut handles = Vec::with_capacity(num_threads as usize);
        for thread_idx in 0..num_threads {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("station-pool-{thread_idx}"))
                .spawn(move || worker_loop(shared, thread_idx))
                .map_err(|e| StationError::ThreadCreation(e.to_string()))?;
            handles.push(handle);
        }

        tracing::debug!(num_threads, busy_wait, "worker pool created");

        Ok(Self {
            shared: Some(shared),
            handles,
        })
    }

    /// Number of worker threads (`0` for the inline pool).
    pub fn num_threads(&self) -> ThreadsNumber {
        self.shared.as_ref().map(|s| s.num_threads).unwrap_or(0)
    }

    /// Runs `pfunc(task_idx, thread_idx)` for every `task_idx` in
    /// `0..num_tasks`, distributed across the pool in batches of
    /// `batch_size` tasks (`0` picks an even automatic split).
    ///
    /// With `callback` set, `execute` hands off the assignment and returns
    /// immediately; `callback` runs, once, on whichever thread finishes
    /// last. Without it, `execute` blocks until every task is done, and
    /// `caller_busy_wait` selects spin-waiting over condition-variable
    /// waiting for *this call's* caller — independent of the spin-vs-condvar
    /// choice the pool's own workers made at [`Pool::create`].
    ///
    /// Fails with [`StationError::Busy`] if a previous assignment handed
    /// off via a callback hasn't finished yet.
    pub fn execute<F, C>(
        &self,
        num_tasks: u32,
        batch_size: u32,
        pfunc: &F,
        callback: Option<&C>,
        caller_busy_wait: bool,
    ) -> Result<(), StationError>
    where
        F: Fn(TaskIdx, ThreadIdx) + Sync,
        C: Fn(ThreadIdx) + Sync,
    {
        if num_tasks == 0 {
            return Err(StationError::InvalidArgument(
                "num_tasks must be non-zero".into(),
            ));
        }

        let Some(shared) = &self.shared else {
            for task_idx in 0..num_tasks {
                pfunc(task_idx, 0);
            }
            if let Some(callback) = callback {
                callback(0);
            }
            return Ok(());
        };

        if shared.busy.swap(true, Ordering::Acquire) {
            return Err(StationError::Busy);
        }

        let batch_size = if batch_size == 0 {
            (num_tasks - 1) / shared.num_threads as u32 + 1
        } else {
            batch_size
        };

        // SAFETY: lifetime-erased for the duration of one assignment; see
        // the Send/Sync justifications on `Assignment`/`Shared` for why no
        // worker can observe `pfunc`/`callback` past that window.
        let pfunc_static: &'static (dyn Fn(TaskIdx, ThreadIdx) + Sync) =
            unsafe { std::mem::transmute(pfunc as &(dyn Fn(TaskIdx, ThreadIdx) + Sync)) };
        let callback_static: Option<&'static (dyn Fn(ThreadIdx) + Sync)> = callback
            .map(|c| unsafe { std::mem::transmute(c as &(dyn Fn(ThreadIdx) + Sync)) });
        let use_pong_cnd = !caller_busy_wait;

        shared.done_tasks.store(0, Ordering::Relaxed);
        shared.thread_counter.store(0, Ordering::Relaxed);

        // SAFETY: no worker can be reading the previous assignment here:
        // either this is the first round, or `busy` was false, which only
        // happens after the prior round's last worker finished with it.
        unsafe {
            *shared.assignment.get() = Some(Assignment {
                pfunc: pfunc_static as *const _,
                callback: callback_static.map(|c| c as *const _),
                num_tasks,
                batch_size,
                use_pong_cnd,
            });
        }

        let ping_sense = !shared.ping_sense.fetch_xor(true, Ordering::Relaxed);
        let pong_sense = !shared.pong_sense.fetch_xor(true, Ordering::Relaxed);

        shared.signal_ping(ping_sense);

        if callback.is_none() {
            shared.wait_pong(pong_sense, use_pong_cnd);
        }

        Ok(())
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        shared.terminate.store(true, Ordering::Release);
        let ping_sense = !shared.ping_sense.fetch_xor(true, Ordering::Relaxed);
        shared.signal_ping(ping_sense);

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
