use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::Signal;

/// The standard (non-realtime) signals the demultiplexer can watch.
/// Mirrors the original runtime's signal switch: the catchable subset of
/// job-control, terminal, timer and resource-limit signals, plus the three
/// termination signals.
pub const STD_SIGNALS: [Signal; 20] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGPIPE,
    Signal::SIGIO,
    Signal::SIGURG,
    Signal::SIGALRM,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGHUP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGWINCH,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// One atomic flag per entry of [`STD_SIGNALS`], in the same order.
///
/// Flags are level-, not edge-, semantics: a delivery while the flag is
/// already set is a no-op. Setting is relaxed; clearing is a swap so a
/// consumer observing `true` also observes every signal delivered before
/// the clear.
#[derive(Default)]
pub struct StdSignalFlags {
    flags: [AtomicBool; STD_SIGNALS.len()],
}

impl StdSignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(signal: Signal) -> Option<usize> {
        STD_SIGNALS.iter().position(|&s| s == signal)
    }

    /// Whether `signal` is one this flag set tracks.
    pub fn tracks(signal: Signal) -> bool {
        Self::index_of(signal).is_some()
    }

    pub(crate) fn set(&self, signal: Signal) {
        if let Some(i) = Self::index_of(signal) {
            self.flags[i].store(true, Ordering::Relaxed);
        }
    }

    /// Current value of `signal`'s flag; `false` for an untracked signal.
    pub fn is_set(&self, signal: Signal) -> bool {
        match Self::index_of(signal) {
            Some(i) => self.flags[i].load(Ordering::Acquire),
            None => false,
        }
    }

    /// Atomically reads and clears `signal`'s flag.
    pub fn test_and_clear(&self, signal: Signal) -> bool {
        match Self::index_of(signal) {
            Some(i) => self.flags[i].swap(false, Ordering::AcqRel),
            None => false,
        }
    }
}

/// One atomic flag per real-time signal in `SIGRTMIN..=SIGRTMAX`, indexed
/// by offset from `SIGRTMIN`. The range is queried at construction time
/// since glibc reserves a few low real-time signal numbers internally.
pub struct RtSignalFlags {
    base: i32,
    flags: Box<[AtomicBool]>,
}

impl RtSignalFlags {
    pub fn new() -> Self {
        let base = libc::SIGRTMIN();
        let max = libc::SIGRTMAX();
        let len = (max - base + 1).max(0) as usize;
        Self {
            base,
            flags: (0..len).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Lowest real-time signal number this flag set tracks (`SIGRTMIN`).
    pub fn base(&self) -> i32 {
        self.base
    }

    /// Highest real-time signal number this flag set tracks (`SIGRTMAX`).
    pub fn max(&self) -> i32 {
        self.base + self.flags.len() as i32 - 1
    }

    fn index_of(&self, signo: i32) -> Option<usize> {
        let offset = signo - self.base;
        if offset >= 0 && (offset as usize) < self.flags.len() {
            Some(offset as usize)
        } else {
            None
        }
    }

    pub(crate) fn set(&self, signo: i32) {
        if let Some(i) = self.index_of(signo) {
            self.flags[i].store(true, Ordering::Relaxed);
        }
    }

    pub fn is_set(&self, signo: i32) -> bool {
        match self.index_of(signo) {
            Some(i) => self.flags[i].load(Ordering::Acquire),
            None => false,
        }
    }

    pub fn test_and_clear(&self, signo: i32) -> bool {
        match self.index_of(signo) {
            Some(i) => self.flags[i].swap(false, Ordering::AcqRel),
            None => false,
        }
    }
}

impl Default for RtSignalFlags {
    fn default() -> Self {
        Self::new()
    }
}
