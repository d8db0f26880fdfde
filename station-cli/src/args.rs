//!
//! station-cli argument surface
//!
//! Positional/flag based, not subcommand based: the host always does the
//! same thing (load a plugin, materialise resources, run its FSM), so
//! there is nothing to dispatch on beyond the plugin path itself.
//!

use std::path::PathBuf;

use clap::Parser;

/// One bool field per catchable standard signal the host can be told to
/// watch in addition to whatever the plugin's `conf` already requested.
macro_rules! signal_flags {
    ($($field:ident => $flag:literal),+ $(,)?) => {
        #[derive(Parser, Debug, Default)]
        pub struct SignalFlags {
            $(
                #[arg(long = $flag)]
                pub $field: bool,
            )+
        }

        impl SignalFlags {
            /// Names of every flag that was passed on the command line.
            pub fn requested(&self) -> Vec<&'static str> {
                let mut out = Vec::new();
                $( if self.$field { out.push($flag); } )+
                out
            }
        }
    };
}

signal_flags! {
    sigint => "SIGINT",
    sigquit => "SIGQUIT",
    sigterm => "SIGTERM",
    sigchld => "SIGCHLD",
    sigcont => "SIGCONT",
    sigtstp => "SIGTSTP",
    sigxcpu => "SIGXCPU",
    sigxfsz => "SIGXFSZ",
    sigpipe => "SIGPIPE",
    sigio => "SIGIO",
    sigurg => "SIGURG",
    sigalrm => "SIGALRM",
    sigvtalrm => "SIGVTALRM",
    sigprof => "SIGPROF",
    sighup => "SIGHUP",
    sigttin => "SIGTTIN",
    sigttou => "SIGTTOU",
    sigwinch => "SIGWINCH",
    sigusr1 => "SIGUSR1",
    sigusr2 => "SIGUSR2",
}

#[derive(Parser, Debug)]
#[command(name = "station")]
#[command(author, version, about = "Plugin-hosted FSM/worker-pool runtime", long_about = None)]
pub struct Cli {
    /// Path to the plugin `cdylib` to load and run.
    pub plugin: Option<PathBuf>,

    /// Print the verbose startup banner (host version, plugin info).
    #[arg(long)]
    pub logo: bool,

    /// Verbose logging (equivalent to `RUST_LOG=debug` without the env var).
    #[arg(short, long)]
    pub verbose: bool,

    /// Call the plugin's own `help` function and exit.
    #[arg(short = 'H', long = "plugin-help")]
    pub plugin_help: bool,

    /// List OpenCL platforms or devices and exit (`platforms` | `devices`).
    #[arg(short = 'C', long = "cl-list", value_name = "WHAT")]
    pub cl_list: Option<String>,

    /// Open or create a file resource. Repeatable.
    #[arg(short = 'f', value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Create a POSIX shared-memory segment: `IDHEX@PATH`. Repeatable.
    #[arg(short = 's', value_name = "IDHEX@PATH")]
    pub shm_create: Vec<String>,

    /// Attach to an existing POSIX shared-memory segment: `IDHEX@PATH`. Repeatable.
    #[arg(short = 'p', value_name = "IDHEX@PATH")]
    pub shm_attach: Vec<String>,

    /// Load an additional dynamic library (not the plugin itself). Repeatable.
    #[arg(short = 'l', value_name = "PATH")]
    pub libraries: Vec<PathBuf>,

    /// Worker-pool thread count; a leading `-` selects busy-wait over
    /// condvar waiting (e.g. `-j -4` is 4 busy-waiting threads).
    #[arg(short = 'j', allow_hyphen_values = true, value_name = "[+-]THREADS")]
    pub threads: Option<String>,

    /// Relay caught signals to another process: `PID[:DMASK]`.
    #[arg(short = 'c', value_name = "PID[:DMASK]")]
    pub relay: Option<String>,

    /// Disable SDL window creation even if the plugin requests it.
    #[arg(short = 'n', long = "no-sdl")]
    pub no_sdl: bool,

    /// Lowest `SIGRTMIN`-relative offset to additionally track.
    #[arg(long = "SIGRTMIN", value_name = "+n", allow_hyphen_values = true)]
    pub sigrtmin: Option<i32>,

    /// Highest `SIGRTMAX`-relative offset (counted backwards) to additionally track.
    #[arg(long = "SIGRTMAX", value_name = "-n", allow_hyphen_values = true)]
    pub sigrtmax: Option<i32>,

    #[command(flatten)]
    pub signals: SignalFlags,

    /// Arguments forwarded to the plugin, after a `--` separator.
    #[arg(last = true)]
    pub plugin_args: Vec<String>,
}

/// Parses `-j`'s `[+-]THREADS` syntax: magnitude is the thread count, a
/// leading `-` selects busy-wait.
pub fn parse_thread_spec(spec: &str) -> Result<(u16, bool), String> {
    let (busy_wait, digits) = match spec.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, spec.strip_prefix('+').unwrap_or(spec)),
    };
    let count: u16 = digits
        .parse()
        .map_err(|_| format!("invalid thread count '{spec}'"))?;
    Ok((count, busy_wait))
}

/// Parses the `IDHEX@PATH` syntax shared by `-s`/`-p`.
pub fn parse_id_at_path(spec: &str) -> Result<(u32, &str), String> {
    let (id_hex, path) = spec
        .split_once('@')
        .ok_or_else(|| format!("expected IDHEX@PATH, got '{spec}'"))?;
    let id = u32::from_str_radix(id_hex, 16)
        .map_err(|_| format!("invalid hex id '{id_hex}' in '{spec}'"))?;
    Ok((id, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_spec_plain_is_condvar_mode() {
        assert_eq!(parse_thread_spec("4").unwrap(), (4, false));
    }

    #[test]
    fn thread_spec_minus_is_busy_wait() {
        assert_eq!(parse_thread_spec("-8").unwrap(), (8, true));
    }

    #[test]
    fn thread_spec_plus_is_condvar_mode() {
        assert_eq!(parse_thread_spec("+2").unwrap(), (2, false));
    }

    #[test]
    fn id_at_path_splits_hex_and_path() {
        let (id, path) = parse_id_at_path("1a@/tmp/seg").unwrap();
        assert_eq!(id, 0x1a);
        assert_eq!(path, "/tmp/seg");
    }

    #[test]
    fn id_at_path_rejects_missing_separator() {
        assert!(parse_id_at_path("no-at-sign").is_err());
    }
}
