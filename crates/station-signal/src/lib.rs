//!
//! station-signal - Signal-demultiplexing Worker
//!
//! A dedicated thread repeatedly performs a short timed signal wait over a
//! caller-chosen set of signals and turns each delivery into an atomic
//! flag set, so state functions can poll for signals instead of running
//! logic inside an async-signal handler. Flags are level-triggered: a
//! delivery while the flag is already set is a no-op, and the
//! demultiplexer never clears a flag itself — clearing is the consumer's
//! job.
//!

mod flags;
mod worker;

pub use flags::{RtSignalFlags, StdSignalFlags, STD_SIGNALS};
pub use worker::{SignalFilter, SignalWorker};
