//!
//! station-plugin - Plugin ABI
//!
//! A plugin is a `cdylib` that exports one symbol,
//! `station_plugin_vtable`, returning a pointer to a `'static`
//! [`PluginVtable`]. The host ([`LoadedPlugin`] in `station-resources`,
//! driven from `station-cli`) resolves that symbol with `libloading`,
//! checks [`PluginFormat::MAGIC`] and [`PluginFormat::VERSION`] for exact
//! equality, then calls `conf` to learn the plugin's resource needs before
//! `init` constructs its FSM.
//!
//! Plugins must not spawn threads from `conf` or `init` — doing so before
//! the signal worker masks its signal set races the mask against whatever
//! the new thread inherited.

use std::os::raw::{c_char, c_int, c_void};

use station_fsm::StateFn;

/// Format tag every plugin vtable carries so the host can reject a
/// mismatched or foreign `cdylib` before calling into it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginFormat {
    pub magic: u32,
    pub version: u32,
}

impl PluginFormat {
    /// Value uniquely identifying the station plugin format.
    pub const MAGIC: u32 = 0xFEED_DEAD;
    /// Value determining host/plugin ABI compatibility, coded as `YYYYMMDD`
    /// of the ABI's last breaking change.
    pub const VERSION: u32 = 20260115;

    pub const CURRENT: PluginFormat = PluginFormat {
        magic: Self::MAGIC,
        version: Self::VERSION,
    };

    /// Whether `self` is exactly the format this host was built against.
    pub fn is_compatible(&self) -> bool {
        *self == Self::CURRENT
    }
}

/// Plugin identification, for `--help`/`--logo` banners.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginInfo {
    pub name: *const c_char,
    pub description: *const c_char,
}

// SAFETY: both pointers are expected to reference `'static` C string
// literals (see `declare_plugin!`), never mutated after the vtable is
// built, so sharing them across threads is sound.
unsafe impl Sync for PluginInfo {}

/// Capacity-needs struct filled in by `conf`, read by the host before
/// `init` is called, so resources can be materialised ahead of time.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ConfArgs {
    /// Number of worker-pool threads to create; negative requests
    /// busy-wait ping/pong instead of condvar-based waiting (sign encodes
    /// `busy_wait`, magnitude encodes the thread count).
    pub fsm_num_threads: i32,

    pub signals_not_needed: bool,
    /// Highest `SIGRTMIN`-relative offset the plugin wants tracked, or
    /// `-1` if it doesn't use real-time signals.
    pub max_rt_signal_offset: i32,

    pub num_files: u32,
    pub num_shared_memory_segments: u32,
    pub num_libraries: u32,

    pub opencl_not_needed: bool,
    pub num_opencl_contexts: u32,

    pub sdl_not_needed: bool,
    pub sdl_init_flags: u32,
}

impl Default for ConfArgs {
    fn default() -> Self {
        Self {
            fsm_num_threads: 0,
            signals_not_needed: true,
            max_rt_signal_offset: -1,
            num_files: 0,
            num_shared_memory_segments: 0,
            num_libraries: 0,
            opencl_not_needed: true,
            num_opencl_contexts: 0,
            sdl_not_needed: true,
            sdl_init_flags: 0,
        }
    }
}

/// Written by `init`: the plugin's opaque resource handle and the FSM it
/// constructed, ready for [`station_fsm::run`].
#[repr(C)]
pub struct InitOutputs {
    pub plugin_resources: *mut c_void,
    pub fsm_initial_state: StateFn,
    pub fsm_data: *mut c_void,
}

/// Bridges the ABI's `*mut c_void` FSM data across the `dyn Any` that
/// [`station_fsm::run`] expects. The host never looks inside; it just
/// hands this back to the plugin's own state functions, which know the
/// concrete type they stored the pointer for.
pub struct PluginFsmData(pub *mut c_void);

/// `argc`/`argv` as passed to `main`, forwarded unchanged to the plugin's
/// help/conf/init functions so it can parse its own trailing arguments.
pub type Argc = c_int;
pub type Argv = *const *const c_char;

/// Prints plugin-specific usage help. Must not do anything else.
pub type PluginHelpFn = extern "C" fn(argc: Argc, argv: Argv) -> c_int;

/// Fills in `args` with the plugin's resource needs.
pub type PluginConfFn = extern "C" fn(args: *mut ConfArgs, argc: Argc, argv: Argv) -> c_int;

/// Allocates plugin resources and constructs the initial FSM state. Must
/// not spawn threads.
pub type PluginInitFn = extern "C" fn(outputs: *mut InitOutputs, argc: Argc, argv: Argv) -> c_int;

/// Releases plugin resources. `quick` is set when called from an
/// `at_quick_exit` handler, where only async-signal-safe cleanup is safe
/// to perform.
pub type PluginFinalFn = extern "C" fn(plugin_resources: *mut c_void, quick: bool) -> c_int;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginFuncTable {
    pub help: Option<PluginHelpFn>,
    pub conf: Option<PluginConfFn>,
    pub init: PluginInitFn,
    pub finalize: PluginFinalFn,
}

/// The complete plugin ABI surface, returned by the exported
/// `station_plugin_vtable` symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginVtable {
    pub format: PluginFormat,
    pub info: PluginInfo,
    pub func: PluginFuncTable,
}

/// Signature every plugin `cdylib` must export under the name
/// `station_plugin_vtable`.
pub type PluginVtableFn = unsafe extern "C" fn() -> *const PluginVtable;

/// Defines a plugin's exported vtable symbol.
///
/// ```ignore
/// station_plugin::declare_plugin! {
///     name: c"hello",
///     description: c"demo plugin",
///     help: None,
///     conf: Some(my_conf),
///     init: my_init,
///     finalize: my_final,
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin {
    (
        name: $name:expr,
        description: $description:expr,
        help: $help:expr,
        conf: $conf:expr,
        init: $init:expr,
        finalize: $finalize:expr $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn station_plugin_vtable() -> *const $crate::PluginVtable {
            static VTABLE: $crate::PluginVtable = $crate::PluginVtable {
                format: $crate::PluginFormat::CURRENT,
                info: $crate::PluginInfo {
                    name: $name.as_ptr(),
                    description: $description.as_ptr(),
                },
                func: $crate::PluginFuncTable {
                    help: $help,
                    conf: $conf,
                    init: $init,
                    finalize: $finalize,
                },
            };
            &VTABLE
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_format_is_self_compatible() {
        assert!(PluginFormat::CURRENT.is_compatible());
    }

    #[test]
    fn mismatched_magic_is_rejected() {
        let bad = PluginFormat {
            magic: 0xDEAD_BEEF,
            version: PluginFormat::VERSION,
        };
        assert!(!bad.is_compatible());
    }

    #[test]
    fn mismatched_version_is_rejected() {
        let bad = PluginFormat {
            magic: PluginFormat::MAGIC,
            version: PluginFormat::VERSION + 1,
        };
        assert!(!bad.is_compatible());
    }

    #[test]
    fn conf_args_default_requests_nothing() {
        let args = ConfArgs::default();
        assert_eq!(args.fsm_num_threads, 0);
        assert!(args.signals_not_needed);
        assert!(args.opencl_not_needed);
        assert!(args.sdl_not_needed);
        assert_eq!(args.num_files, 0);
    }

    extern "C" fn noop_init(outputs: *mut InitOutputs, _argc: Argc, _argv: Argv) -> c_int {
        fn terminate(state: &mut station_fsm::FsmState, _data: &mut dyn std::any::Any, _ctx: &station_fsm::FsmContext) {
            state.set_next(None);
        }
        unsafe {
            (*outputs).plugin_resources = std::ptr::null_mut();
            (*outputs).fsm_initial_state = terminate;
            (*outputs).fsm_data = std::ptr::null_mut();
        }
        0
    }

    extern "C" fn noop_final(_resources: *mut c_void, _quick: bool) -> c_int {
        0
    }

    declare_plugin! {
        name: c"test-plugin",
        description: c"unit test fixture",
        help: None,
        conf: None,
        init: noop_init,
        finalize: noop_final,
    }

    fn placeholder_state(state: &mut station_fsm::FsmState, _data: &mut dyn std::any::Any, _ctx: &station_fsm::FsmContext) {
        state.set_next(None);
    }

    #[test]
    fn declared_vtable_round_trips_through_the_exported_symbol() {
        let vtable = unsafe { &*station_plugin_vtable() };
        assert!(vtable.format.is_compatible());
        assert!(vtable.func.conf.is_none());

        let mut outputs = InitOutputs {
            plugin_resources: std::ptr::null_mut(),
            fsm_initial_state: placeholder_state,
            fsm_data: std::ptr::null_mut(),
        };
        let rc = (vtable.func.init)(&mut outputs, 0, std::ptr::null());
        assert_eq!(rc, 0);
        assert!(outputs.plugin_resources.is_null());
    }
}
