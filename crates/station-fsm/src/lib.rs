//!
//! station-fsm - Finite State Machine Driver
//!
//! A state function has full write access to the current state record and
//! decides the next state by overwriting `sfunc`. Execution stops the
//! first time a state function leaves `sfunc` as `None`. This mirrors the
//! original runtime's driver loop exactly:
//!
//! ```text
//! while (state.sfunc != NULL)
//!     state.sfunc(&state, fsm_data);
//! ```
//!
//! A state function may submit at most one outstanding worker-pool
//! assignment and poll signal flags through [`FsmContext`], which bundles
//! the handles a plugin's states need instead of reaching for globals.

use std::any::Any;

use station_pool::Pool;
use station_signal::{RtSignalFlags, StdSignalFlags};

/// Current (on call) and next (on return) state of the machine.
pub struct FsmState {
    pub sfunc: Option<StateFn>,
}

impl FsmState {
    /// Sets the next state to run, or `None` to stop the machine.
    pub fn set_next(&mut self, next: Option<StateFn>) {
        self.sfunc = next;
    }
}

/// A state function: inspects/mutates `fsm_data`, reads the runtime
/// handles in `context`, and sets `state.sfunc` to the next state (or
/// `None` to terminate the machine).
pub type StateFn = fn(state: &mut FsmState, fsm_data: &mut dyn Any, context: &FsmContext);

/// Runtime handles available to every state function: the worker pool and
/// the two signal flag sets. Any of them may be absent, matching a plugin
/// that declared it doesn't need threads or signal handling.
pub struct FsmContext<'a> {
    pub pool: Option<&'a Pool>,
    pub std_signals: Option<&'a StdSignalFlags>,
    pub rt_signals: Option<&'a RtSignalFlags>,
}

impl<'a> FsmContext<'a> {
    pub fn new(
        pool: Option<&'a Pool>,
        std_signals: Option<&'a StdSignalFlags>,
        rt_signals: Option<&'a RtSignalFlags>,
    ) -> Self {
        Self {
            pool,
            std_signals,
            rt_signals,
        }
    }
}

/// Runs the finite state machine starting from `initial_state`, calling
/// each state function in turn until one leaves `sfunc` as `None`.
pub fn run(initial_state: StateFn, fsm_data: &mut dyn Any, context: &FsmContext) {
    let mut state = FsmState {
        sfunc: Some(initial_state),
    };

    while let Some(sfunc) = state.sfunc {
        tracing::trace!("fsm: entering state");
        sfunc(&mut state, fsm_data, context);
    }
    tracing::trace!("fsm: terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context() -> FsmContext<'static> {
        FsmContext::new(None, None, None)
    }

    #[test]
    fn single_state_terminates_immediately() {
        fn only(state: &mut FsmState, _data: &mut dyn Any, _ctx: &FsmContext) {
            state.set_next(None);
        }

        let mut data: u32 = 0;
        run(only, &mut data, &empty_context());
    }

    #[test]
    fn chains_states_and_carries_data() {
        fn first(state: &mut FsmState, data: &mut dyn Any, _ctx: &FsmContext) {
            *data.downcast_mut::<u32>().unwrap() += 1;
            state.set_next(Some(second));
        }
        fn second(state: &mut FsmState, data: &mut dyn Any, _ctx: &FsmContext) {
            *data.downcast_mut::<u32>().unwrap() += 10;
            state.set_next(None);
        }

        let mut data: u32 = 0;
        run(first, &mut data, &empty_context());
        assert_eq!(data, 11);
    }

    #[test]
    fn loops_until_counter_exhausted() {
        fn counting(state: &mut FsmState, data: &mut dyn Any, _ctx: &FsmContext) {
            let counter = data.downcast_mut::<u32>().unwrap();
            *counter += 1;
            state.set_next(if *counter < 5 { Some(counting) } else { None });
        }

        let mut data: u32 = 0;
        run(counting, &mut data, &empty_context());
        assert_eq!(data, 5);
    }

    #[test]
    fn state_uses_pool_from_context() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use station_core::ThreadIdx;

        fn run_once(state: &mut FsmState, data: &mut dyn Any, ctx: &FsmContext) {
            let total = data.downcast_mut::<AtomicU64>().unwrap();
            let pool = ctx.pool.expect("pool present");
            pool.execute::<_, fn(ThreadIdx)>(
                100,
                0,
                &|i, _t| {
                    total.fetch_add(i as u64, Ordering::Relaxed);
                },
                None,
                true,
            )
            .unwrap();
            state.set_next(None);
        }

        let pool = Pool::create(4, true).unwrap();
        let context = FsmContext::new(Some(&pool), None, None);
        let mut total = AtomicU64::new(0);
        run(run_once, &mut total, &context);
        assert_eq!(total.load(Ordering::Relaxed), (0..100u64).sum::<u64>());
    }

    #[test]
    fn state_polls_signal_flags_from_context() {
        // Real OS signal delivery is covered end to end by station-signal's
        // own tests (which can target the worker thread directly via
        // pthread_kill); a process-directed signal sent from a sibling
        // crate's test can land on, and be silently discarded by, some
        // unrelated thread in the test binary that isn't blocking it. This
        // test instead checks what's actually station-fsm's concern: that
        // `FsmContext` hands a state function the very same flag sets the
        // caller constructed.
        use nix::sys::signal::Signal;
        use std::sync::Arc;

        fn check(state: &mut FsmState, data: &mut dyn Any, ctx: &FsmContext) {
            let seen = data.downcast_mut::<bool>().unwrap();
            *seen = ctx
                .std_signals
                .expect("signal flags present")
                .is_set(Signal::SIGUSR1);
            state.set_next(None);
        }

        let std_flags = Arc::new(StdSignalFlags::new());
        let context = FsmContext::new(None, Some(&std_flags), None);

        let mut seen = true;
        run(check, &mut seen, &context);
        assert!(!seen, "no signal delivered yet, flag must read false");
    }
}
