//!
//! station - the plugin host binary
//!
//! Parses CLI flags, loads a plugin `cdylib`, asks it what it needs
//! (`conf`), materialises those resources, calls `init` to get the
//! plugin's FSM, drives that FSM on the main thread, then tears
//! everything down in reverse construction order. Mirrors
//! `namlc/src/main.rs`'s error style: one `eprintln!` per failure
//! followed by `std::process::exit` with the contractual code, no
//! blanket error type at the binary boundary.
//!

mod args;

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, OnceLock};

use clap::Parser;
use nix::sys::signal::Signal;
use tracing_subscriber::EnvFilter;

use args::{parse_id_at_path, parse_thread_spec, Cli};
use station_core::StationError;
use station_fsm::FsmContext;
use station_plugin::{Argc, Argv, ConfArgs, InitOutputs, PluginFinalFn, PluginFsmData};
use station_pool::Pool;
use station_resources::{FileHandle, LoadedLibrary, SharedMemorySegment};
use station_signal::{RtSignalFlags, SignalWorker, StdSignalFlags, STD_SIGNALS};

/// State the `at_quick_exit` hook needs, since `libc::at_quick_exit` only
/// accepts a plain `extern "C" fn()` with no captured state.
struct FinalizeState {
    finalize: PluginFinalFn,
    resources: AtomicPtr<c_void>,
    done: AtomicBool,
}

static FINALIZE_STATE: OnceLock<FinalizeState> = OnceLock::new();

// Not bound by the `libc` crate on this target; glibc has provided it since
// C11 and Rust's own `std::process` uses the same symbol for `quick_exit`.
unsafe extern "C" {
    fn at_quick_exit(func: extern "C" fn()) -> c_int;
}

/// Registered via `at_quick_exit`: runs the plugin's abrupt teardown path
/// if the process is torn down via `quick_exit` (e.g. a signal handler
/// elsewhere deciding normal unwinding, which may join pool threads, is
/// unsafe to run) instead of the normal `run()` return path.
extern "C" fn run_quick_finalize() {
    let Some(state) = FINALIZE_STATE.get() else {
        return;
    };
    if state.done.swap(true, Ordering::AcqRel) {
        return;
    }
    let resources = state.resources.load(Ordering::Acquire);
    let rc = (state.finalize)(resources, true);
    if rc != 0 {
        tracing::error!(rc, "plugin final() reported failure (quick-exit path)");
    }
}

const LOGO: &str = r#"
  ___ _        _   _
 / __| |_ __ _| |_(_)___ _ _
 \__ \  _/ _` |  _| / _ \ ' \
 |___/\__\__,_|\__|_\___/_||_|
 plugin-hosted FSM/worker-pool runtime
"#;

/// Owns the `CString`s backing a plugin `argc`/`argv` pair so the pointer
/// array stays valid for as long as the plugin call needs it.
struct CArgs {
    _owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CArgs {
    fn new(args: &[String]) -> Self {
        let owned: Vec<CString> = args
            .iter()
            .map(|s| CString::new(s.as_str()).expect("plugin arg contains NUL"))
            .collect();
        let ptrs = owned.iter().map(|c| c.as_ptr()).collect();
        Self { _owned: owned, ptrs }
    }

    fn as_argc_argv(&self) -> (Argc, Argv) {
        (self.ptrs.len() as c_int, self.ptrs.as_ptr())
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.logo {
        println!("{LOGO}");
    }

    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("station: error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<(), StationError> {
    let Some(plugin_path) = &cli.plugin else {
        if cli.logo {
            return Ok(());
        }
        return Err(StationError::ArgumentError(
            "missing required plugin path".into(),
        ));
    };

    if let Some(what) = &cli.cl_list {
        return list_opencl(what);
    }

    let path_str = plugin_path.display().to_string();
    let library = LoadedLibrary::load(&path_str)
        .map_err(|e| StationError::PluginLoadError(e.to_string()))?;
    let vtable = library
        .plugin_vtable()
        .map_err(|e| StationError::PluginLoadError(e.to_string()))?;

    tracing::info!(plugin = %path_str, "plugin loaded");

    let plugin_cargs = CArgs::new(&cli.plugin_args);
    let (argc, argv) = plugin_cargs.as_argc_argv();

    if cli.plugin_help {
        match vtable.func.help {
            Some(help) => {
                help(argc, argv);
            }
            None => println!("(plugin does not implement --plugin-help)"),
        }
        return Ok(());
    }

    let mut conf_args = ConfArgs::default();
    if let Some(conf) = vtable.func.conf {
        conf(&mut conf_args, argc, argv);
    }

    // CLI thread-count override takes precedence over whatever the plugin
    // requested via `conf`.
    let (num_threads, busy_wait) = match &cli.threads {
        Some(spec) => parse_thread_spec(spec).map_err(StationError::ArgumentError)?,
        None => (
            conf_args.fsm_num_threads.unsigned_abs() as u16,
            conf_args.fsm_num_threads < 0,
        ),
    };

    // Signals are masked on the main thread before any other thread is
    // spawned, so the worker pool's threads inherit the block too (only
    // the signal worker itself actually waits on the masked set).
    let (_signal_worker, std_flags, rt_flags) = materialise_signals(&cli, &conf_args)?;

    let pool = Pool::create(num_threads, busy_wait)?;
    tracing::info!(num_threads, busy_wait, "worker pool materialised");

    let _files = materialise_files(&cli.files)?;
    let _shm_created = materialise_shm_create(&cli.shm_create)?;
    let _shm_attached = materialise_shm_attach(&cli.shm_attach)?;
    let _libraries = materialise_libraries(&cli.libraries)?;

    if let Some(relay) = &cli.relay {
        tracing::info!(spec = %relay, "signal relay requested (parsed only, not actioned)");
    }

    let context = FsmContext::new(Some(&pool), std_flags.as_deref(), rt_flags.as_deref());

    let mut outputs = InitOutputs {
        plugin_resources: std::ptr::null_mut(),
        fsm_initial_state: noop_state,
        fsm_data: std::ptr::null_mut(),
    };
    let init_rc = (vtable.func.init)(&mut outputs, argc, argv);
    if init_rc != 0 {
        return Err(StationError::PluginLoadError(format!(
            "plugin init() returned {init_rc}"
        )));
    }

    FINALIZE_STATE
        .set(FinalizeState {
            finalize: vtable.func.finalize,
            resources: AtomicPtr::new(outputs.plugin_resources),
            done: AtomicBool::new(false),
        })
        .map_err(|_| StationError::AtExitError("finalize state already registered".into()))?;
    // SAFETY: `run_quick_finalize` is a plain extern "C" fn with no captured
    // state; it only reads `FINALIZE_STATE`, set just above.
    if unsafe { at_quick_exit(run_quick_finalize) } != 0 {
        return Err(StationError::AtExitError(
            "at_quick_exit registration failed".into(),
        ));
    }

    let mut fsm_data = PluginFsmData(outputs.fsm_data);
    station_fsm::run(outputs.fsm_initial_state, &mut fsm_data, &context);

    let already_finalized = FINALIZE_STATE
        .get()
        .map(|s| s.done.swap(true, Ordering::AcqRel))
        .unwrap_or(false);
    if !already_finalized {
        let final_rc = (vtable.func.finalize)(outputs.plugin_resources, false);
        if final_rc != 0 {
            tracing::error!(rc = final_rc, "plugin final() reported failure");
        }
    }

    Ok(())
}

fn noop_state(
    state: &mut station_fsm::FsmState,
    _data: &mut dyn std::any::Any,
    _ctx: &FsmContext,
) {
    state.set_next(None);
}

type SignalMaterialisation = (
    Option<SignalWorker>,
    Option<Arc<StdSignalFlags>>,
    Option<Arc<RtSignalFlags>>,
);

fn materialise_signals(cli: &Cli, conf_args: &ConfArgs) -> Result<SignalMaterialisation, StationError> {
    let requested = cli.signals.requested();
    let mut std_signals: Vec<Signal> = requested
        .iter()
        .filter_map(|name| name_to_signal(name))
        .collect();
    if !conf_args.signals_not_needed && std_signals.is_empty() {
        std_signals = STD_SIGNALS.to_vec();
    }

    let std_flags = Arc::new(StdSignalFlags::new());
    let rt_flags = Arc::new(RtSignalFlags::new());

    let mut rt_offsets: Vec<i32> = if conf_args.max_rt_signal_offset >= 0 {
        (0..=conf_args.max_rt_signal_offset).collect()
    } else {
        Vec::new()
    };
    if let Some(n) = cli.sigrtmin {
        rt_offsets.extend(0..=n.max(0));
    }
    if let Some(n) = cli.sigrtmax {
        let top = rt_flags.max() - rt_flags.base();
        rt_offsets.extend((top - n.max(0)).max(0)..=top);
    }
    rt_offsets.sort_unstable();
    rt_offsets.dedup();
    let rt_signos: Vec<i32> = rt_offsets.iter().map(|o| rt_flags.base() + o).collect();

    if std_signals.is_empty() && rt_signos.is_empty() {
        return Ok((None, None, None));
    }

    let worker = SignalWorker::start(
        &std_signals,
        &rt_signos,
        Arc::clone(&std_flags),
        Arc::clone(&rt_flags),
        None,
    )?;
    tracing::info!(
        std_signals = std_signals.len(),
        rt_signals = rt_signos.len(),
        "signal worker started"
    );

    Ok((Some(worker), Some(std_flags), Some(rt_flags)))
}

fn name_to_signal(name: &str) -> Option<Signal> {
    STD_SIGNALS.iter().find(|s| format!("{s:?}") == name).copied()
}

fn materialise_files(paths: &[std::path::PathBuf]) -> Result<Vec<FileHandle>, StationError> {
    paths
        .iter()
        .map(|p| {
            if p.exists() {
                FileHandle::open(p)
            } else {
                FileHandle::create(p)
            }
        })
        .collect()
}

fn materialise_shm_create(specs: &[String]) -> Result<Vec<SharedMemorySegment>, StationError> {
    const DEFAULT_SEGMENT_SIZE: usize = 4096;
    specs
        .iter()
        .map(|spec| {
            let (id, path) = parse_id_at_path(spec).map_err(StationError::ArgumentError)?;
            tracing::info!(id, path, "creating shared-memory segment");
            SharedMemorySegment::create(path, DEFAULT_SEGMENT_SIZE)
        })
        .collect()
}

fn materialise_shm_attach(specs: &[String]) -> Result<Vec<SharedMemorySegment>, StationError> {
    specs
        .iter()
        .map(|spec| {
            let (id, path) = parse_id_at_path(spec).map_err(StationError::ArgumentError)?;
            tracing::info!(id, path, "attaching shared-memory segment");
            SharedMemorySegment::attach(path)
        })
        .collect()
}

fn materialise_libraries(paths: &[std::path::PathBuf]) -> Result<Vec<LoadedLibrary>, StationError> {
    paths
        .iter()
        .map(|p| LoadedLibrary::load(&p.display().to_string()))
        .collect()
}

fn list_opencl(what: &str) -> Result<(), StationError> {
    match what {
        "platforms" | "devices" => {
            #[cfg(feature = "opencl")]
            {
                println!("(OpenCL {what} enumeration requires the `opencl` feature's runtime ICD loader)");
            }
            #[cfg(not(feature = "opencl"))]
            {
                println!("station was built without OpenCL support (`--cl-list {what}` has nothing to list)");
            }
            Ok(())
        }
        other => Err(StationError::ArgumentError(format!(
            "--cl-list expects 'platforms' or 'devices', got '{other}'"
        ))),
    }
}
