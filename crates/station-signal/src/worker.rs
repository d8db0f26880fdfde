use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nix::sys::signal::Signal;
use station_core::StationError;

use crate::flags::{RtSignalFlags, StdSignalFlags};

const SIGTIMEDWAIT_TIMEOUT_NANO: i64 = 1_000_000; // 1 ms

/// Filter hook run before a signal's flag is set. Returning `false`
/// suppresses the update for that delivery. Receives the `siginfo_t` that
/// `sigtimedwait` returned for the delivery, so a filter can inspect e.g.
/// `si_pid`/`si_value` before deciding.
pub type SignalFilter =
    dyn Fn(i32, &libc::siginfo_t, &StdSignalFlags, &RtSignalFlags) -> bool + Send + Sync;

fn build_sigset(std_signals: &[Signal], rt_signals: &[i32]) -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        for &signal in std_signals {
            libc::sigaddset(&mut set, signal as libc::c_int);
        }
        for &signo in rt_signals {
            libc::sigaddset(&mut set, signo);
        }
        set
    }
}

/// A dedicated thread that waits on a fixed set of signals and turns their
/// delivery into atomic flag updates.
///
/// The requested signals are blocked on the calling thread (so the process
/// mask inherits the block) before the worker starts, and unblocked again
/// when the worker is dropped.
pub struct SignalWorker {
    thread: Option<JoinHandle<()>>,
    terminate: Arc<AtomicBool>,
    mask: libc::sigset_t,
}

impl SignalWorker {
    /// Starts the worker, watching `std_signals`/`rt_signals` (real-time
    /// signal numbers, each in `SIGRTMIN..=SIGRTMAX`) and publishing
    /// deliveries into `std_flags`/`rt_flags`.
    pub fn start(
        std_signals: &[Signal],
        rt_signals: &[i32],
        std_flags: Arc<StdSignalFlags>,
        rt_flags: Arc<RtSignalFlags>,
        filter: Option<Arc<SignalFilter>>,
    ) -> Result<Self, StationError> {
        let mask = build_sigset(std_signals, rt_signals);

        if unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut()) } != 0 {
            return Err(StationError::SignalSetupError(
                std::io::Error::last_os_error().to_string(),
            ));
        }

        let terminate = Arc::new(AtomicBool::new(false));
        let thread_terminate = Arc::clone(&terminate);

        let spawned = thread::Builder::new()
            .name("station-signal".into())
            .spawn(move || signal_loop(mask, thread_terminate, std_flags, rt_flags, filter));

        let thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                unsafe {
                    libc::pthread_sigmask(libc::SIG_UNBLOCK, &mask, std::ptr::null_mut());
                }
                return Err(StationError::ThreadCreation(e.to_string()));
            }
        };

        tracing::debug!(
            std_signals = std_signals.len(),
            rt_signals = rt_signals.len(),
            "signal worker started"
        );

        Ok(Self {
            thread: Some(thread),
            terminate,
            mask,
        })
    }

    /// The worker thread's native handle, for sending it a thread-directed
    /// signal directly (`pthread_kill`) instead of relying on the kernel to
    /// pick an arbitrary unblocking thread for a process-directed one — the
    /// only reliable way to target this worker from a multi-threaded test
    /// binary where other threads may not share its blocked mask.
    pub fn raw_thread(&self) -> libc::pthread_t {
        use std::os::unix::thread::JoinHandleExt;
        self.thread.as_ref().unwrap().as_pthread_t()
    }
}

fn signal_loop(
    wait_set: libc::sigset_t,
    terminate: Arc<AtomicBool>,
    std_flags: Arc<StdSignalFlags>,
    rt_flags: Arc<RtSignalFlags>,
    filter: Option<Arc<SignalFilter>>,
) {
    let timeout = libc::timespec {
        tv_sec: 0,
        tv_nsec: SIGTIMEDWAIT_TIMEOUT_NANO,
    };

    while !terminate.load(Ordering::Relaxed) {
        let mut siginfo: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let signo = unsafe { libc::sigtimedwait(&wait_set, &mut siginfo, &timeout) };
        if signo <= 0 {
            continue;
        }

        let set_flag = match &filter {
            Some(f) => f(signo, &siginfo, &std_flags, &rt_flags),
            None => true,
        };
        if !set_flag {
            continue;
        }

        match Signal::try_from(signo) {
            Ok(signal) if StdSignalFlags::tracks(signal) => std_flags.set(signal),
            _ => rt_flags.set(signo),
        }
    }
}

impl Drop for SignalWorker {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        unsafe {
            libc::pthread_sigmask(libc::SIG_UNBLOCK, &self.mask, std::ptr::null_mut());
        }
    }
}
