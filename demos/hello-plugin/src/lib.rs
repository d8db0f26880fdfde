//!
//! hello-plugin - reference station plugin
//!
//! Exercises the full ABI end to end: `conf` asks for a worker pool and
//! the standard signal set, `init` allocates a small counter and hands
//! back a three-state FSM, and the states themselves submit one
//! worker-pool assignment per transition and poll `SIGINT`/`SIGTERM`
//! through the context rather than a signal handler. Mirrors
//! `demo/plugin.c`'s `pfunc_inc`/`pfunc_dec`/`sfunc_pre`/`sfunc_loop`/
//! `sfunc_post` shape, minus the SDL/OpenCL drawing path those states also
//! drive (this host doesn't need a window to prove the FSM/pool/signal
//! wiring works).

use std::any::Any;
use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use nix::sys::signal::Signal;
use station_fsm::{FsmContext, FsmState};
use station_plugin::{Argc, Argv, ConfArgs, InitOutputs, PluginFsmData};

const NUM_TASKS: u32 = 128;
const BATCH_SIZE: u32 = 16;

struct PluginResources {
    counter: AtomicI64,
    frozen: AtomicBool,
    frame: AtomicU32,
}

fn resources_from(data: &mut dyn Any) -> &PluginResources {
    let wrapper = data
        .downcast_mut::<PluginFsmData>()
        .expect("fsm_data is a PluginFsmData pointer");
    // SAFETY: `init` boxed this pointer and `final` is the only thing that
    // frees it; every state invocation between them happens on the single
    // FSM driver thread, so this reference can't outlive or alias badly.
    unsafe { &*(wrapper.0 as *const PluginResources) }
}

fn sfunc_pre(state: &mut FsmState, fsm_data: &mut dyn Any, ctx: &FsmContext) {
    println!("sfunc_pre()");
    let resources = resources_from(fsm_data);

    let pool = ctx.pool.expect("conf requested a worker pool");
    pool.execute::<_, fn(u16)>(
        NUM_TASKS,
        BATCH_SIZE,
        &|task_idx, _thread_idx| {
            resources.counter.fetch_add(task_idx as i64, Ordering::Relaxed);
        },
        None,
        false,
    )
    .expect("pool is idle at startup");

    let expected = (NUM_TASKS as i64 * (NUM_TASKS as i64 - 1)) / 2;
    if resources.counter.load(Ordering::Relaxed) != expected {
        println!("counter has incorrect value");
    }

    state.set_next(Some(sfunc_loop));
}

fn sfunc_loop(state: &mut FsmState, fsm_data: &mut dyn Any, ctx: &FsmContext) {
    let resources = resources_from(fsm_data);
    let std_signals = ctx.std_signals.expect("conf requested the signal worker");

    if std_signals.test_and_clear(Signal::SIGTERM) {
        println!("Caught SIGTERM, quitting...");
        state.set_next(Some(sfunc_post));
        return;
    }
    if std_signals.test_and_clear(Signal::SIGINT) {
        println!("Caught SIGINT, quitting...");
        state.set_next(Some(sfunc_post));
        return;
    }
    if std_signals.test_and_clear(Signal::SIGTSTP) {
        let was_frozen = resources.frozen.fetch_xor(true, Ordering::Relaxed);
        println!("{}", if was_frozen { "Resuming" } else { "Freezing" });
    }

    if !resources.frozen.load(Ordering::Relaxed) {
        resources.frame.fetch_add(1, Ordering::Relaxed);
    }

    state.set_next(Some(sfunc_loop));
    std::thread::yield_now();
}

fn sfunc_post(state: &mut FsmState, fsm_data: &mut dyn Any, ctx: &FsmContext) {
    println!("sfunc_post()");
    let resources = resources_from(fsm_data);

    let pool = ctx.pool.expect("conf requested a worker pool");
    pool.execute::<_, fn(u16)>(
        NUM_TASKS,
        BATCH_SIZE,
        &|task_idx, _thread_idx| {
            resources.counter.fetch_sub(task_idx as i64, Ordering::Relaxed);
        },
        None,
        false,
    )
    .expect("pool is idle between assignments");

    if resources.counter.load(Ordering::Relaxed) != 0 {
        println!("counter has incorrect value");
    }

    state.set_next(None);
}

extern "C" fn plugin_help(argc: Argc, argv: Argv) -> c_int {
    println!("plugin_help({argc},");
    for arg in argv_strings(argc, argv) {
        println!("  \"{arg}\",");
    }
    println!(")");
    0
}

extern "C" fn plugin_conf(args: *mut ConfArgs, _argc: Argc, _argv: Argv) -> c_int {
    // SAFETY: the host allocates `args` on its stack and keeps it alive
    // for the duration of this call; this is the one place in the ABI
    // `conf` is allowed to write to it.
    unsafe {
        (*args).fsm_num_threads = 4;
        (*args).signals_not_needed = false;
        (*args).max_rt_signal_offset = -1;
        (*args).opencl_not_needed = true;
        (*args).sdl_not_needed = true;
    }
    0
}

extern "C" fn plugin_init(outputs: *mut InitOutputs, _argc: Argc, _argv: Argv) -> c_int {
    println!("plugin_init()");

    let resources = Box::new(PluginResources {
        counter: AtomicI64::new(0),
        frozen: AtomicBool::new(false),
        frame: AtomicU32::new(0),
    });
    let raw = Box::into_raw(resources);

    // SAFETY: same contract as `conf` above, for `InitOutputs`.
    unsafe {
        (*outputs).plugin_resources = raw as *mut c_void;
        (*outputs).fsm_initial_state = sfunc_pre;
        (*outputs).fsm_data = raw as *mut c_void;
    }
    0
}

extern "C" fn plugin_final(plugin_resources: *mut c_void, quick: bool) -> c_int {
    println!("plugin_final()");
    if plugin_resources.is_null() {
        return 1;
    }
    if quick {
        // abnormal termination path: the process is already unwinding on a
        // caught signal, so skip anything beyond reclaiming the allocation.
        unsafe {
            drop(Box::from_raw(plugin_resources as *mut PluginResources));
        }
        return 0;
    }
    unsafe {
        drop(Box::from_raw(plugin_resources as *mut PluginResources));
    }
    0
}

/// Decodes the host's `argc`/`argv` into owned `String`s, for printing.
fn argv_strings(argc: Argc, argv: Argv) -> Vec<String> {
    if argv.is_null() {
        return Vec::new();
    }
    (0..argc as isize)
        .map(|i| unsafe {
            let ptr = *argv.offset(i);
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        })
        .collect()
}

station_plugin::declare_plugin! {
    name: c"hello-plugin",
    description: c"reference plugin exercising the full station ABI",
    help: Some(plugin_help),
    conf: Some(plugin_conf),
    init: plugin_init,
    finalize: plugin_final,
}
