use libloading::{Library, Symbol};

use station_core::StationError;
use station_plugin::{PluginFormat, PluginVtable, PluginVtableFn};

/// A dynamically loaded plugin `cdylib`, holding the library open for as
/// long as its resolved vtable pointer may be dereferenced.
#[derive(Debug)]
pub struct LoadedLibrary {
    path: String,
    library: Library,
}

impl LoadedLibrary {
    /// Loads the library at `path`. Does not resolve or validate the
    /// plugin vtable yet; see [`Self::plugin_vtable`].
    pub fn load(path: &str) -> Result<Self, StationError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| StationError::LibraryError(format!("{path}: {e}")))?;
        tracing::info!(path, "library loaded");
        Ok(Self {
            path: path.to_string(),
            library,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves the `station_plugin_vtable` symbol and checks its format
    /// tag for exact magic/version equality before handing back the
    /// vtable reference. The returned reference borrows `self`, since the
    /// vtable lives in the library's mapped memory.
    pub fn plugin_vtable(&self) -> Result<&PluginVtable, StationError> {
        let vtable_fn: Symbol<PluginVtableFn> = unsafe {
            self.library
                .get(b"station_plugin_vtable\0")
                .map_err(|e| StationError::LibraryError(format!("{}: {e}", self.path)))?
        };

        let vtable = unsafe { &*vtable_fn() };
        if !vtable.format.is_compatible() {
            return Err(StationError::LibraryError(format!(
                "{}: incompatible plugin format (magic={:#x}, version={}, expected magic={:#x}, version={})",
                self.path,
                vtable.format.magic,
                vtable.format.version,
                PluginFormat::MAGIC,
                PluginFormat::VERSION,
            )));
        }

        Ok(vtable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_a_nonexistent_library_is_a_library_error() {
        let err = LoadedLibrary::load("/nonexistent/station-resources-test.so").unwrap_err();
        assert!(matches!(err, StationError::LibraryError(_)));
    }

    #[test]
    fn loading_a_non_library_file_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-library.so");
        std::fs::write(&path, b"not an ELF shared object").unwrap();
        let err = LoadedLibrary::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, StationError::LibraryError(_)));
    }
}
