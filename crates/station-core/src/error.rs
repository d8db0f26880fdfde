//!
//! Error Kinds for the station Runtime
//!
//! This module defines the error type returned by fallible core entry
//! points. Every variant maps to exactly one of the numeric exit codes the
//! host process is contractually required to use (see `exit_code`).
//!
//! Error categories:
//! - InvalidArgument: null handles, zero task counts, malformed signal numbers
//! - OutOfMemory: allocation failure, always leaves partial state torn down
//! - ThreadCreation/ThreadNoMem: distinguishes transient from systemic failure
//! - Busy: worker pool rejects an overlapping `execute` call
//! - PlatformNotSupported: built without concurrency primitives
//! - FileError/SharedMemoryError/LibraryError/SignalSetup/OpenCl/Sdl: resource
//!   collaborator failures
//! - PluginLoad/AtExit: host-level failures outside the concurrency core
//!

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("failed to spawn thread: {0}")]
    ThreadCreation(String),

    #[error("insufficient memory to spawn thread")]
    ThreadNoMem,

    #[error("worker pool is already busy")]
    Busy,

    #[error("platform does not support concurrency primitives")]
    PlatformNotSupported,

    #[error("file error: {0}")]
    FileError(String),

    #[error("shared-memory error: {0}")]
    SharedMemoryError(String),

    #[error("library error: {0}")]
    LibraryError(String),

    #[error("signal setup error: {0}")]
    SignalSetupError(String),

    #[error("OpenCL error: {0}")]
    OpenClError(String),

    #[error("SDL error: {0}")]
    SdlError(String),

    #[error("plugin load error: {0}")]
    PluginLoadError(String),

    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("atexit error: {0}")]
    AtExitError(String),
}

impl StationError {
    /// Numeric exit code mandated by the plugin-host contract (spec.md §6).
    /// Values are part of the contract and must not be renumbered.
    pub fn exit_code(&self) -> i32 {
        match self {
            StationError::ArgumentError(_) => 66,
            StationError::PluginLoadError(_) => 67,
            StationError::OutOfMemory => 68,
            StationError::FileError(_) => 69,
            StationError::SharedMemoryError(_) => 70,
            StationError::LibraryError(_) => 71,
            StationError::SignalSetupError(_) => 72,
            StationError::ThreadCreation(_) | StationError::ThreadNoMem => 73,
            StationError::OpenClError(_) => 74,
            StationError::SdlError(_) => 75,
            StationError::AtExitError(_) => 65,
            StationError::InvalidArgument(_)
            | StationError::Busy
            | StationError::PlatformNotSupported => 66,
        }
    }
}
