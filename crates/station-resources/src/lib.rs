//!
//! station-resources - Resource Collaborators
//!
//! Thin wrappers over platform APIs: files, POSIX shared memory, and
//! dynamically loaded plugin libraries, plus two feature-gated
//! collaborators (OpenCL, SDL) that are compiled out by default.

mod file;
mod library;
mod shared_memory;

#[cfg(feature = "opencl")]
mod opencl;
#[cfg(feature = "sdl")]
mod sdl;

pub use file::FileHandle;
pub use library::LoadedLibrary;
pub use shared_memory::SharedMemorySegment;

#[cfg(feature = "opencl")]
pub use opencl::OpenClContext;
#[cfg(feature = "sdl")]
pub use sdl::{NullSdlContext, SdlContext};
