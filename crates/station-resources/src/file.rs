use std::fs::{File, OpenOptions};
use std::path::Path;

use station_core::StationError;

/// Open/close tracking over `std::fs::File`. The plugin ABI only ever
/// hands plugins an opaque handle count; this is the thing behind it.
#[derive(Debug)]
pub struct FileHandle {
    file: Option<File>,
    path: String,
}

impl FileHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StationError> {
        let path_str = path.as_ref().display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StationError::FileError(format!("{}: {e}", path_str)))?;
        tracing::info!(path = %path_str, "file opened");
        Ok(Self {
            file: Some(file),
            path: path_str,
        })
    }

    pub fn create(path: impl AsRef<Path>) -> Result<Self, StationError> {
        let path_str = path.as_ref().display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StationError::FileError(format!("{}: {e}", path_str)))?;
        tracing::info!(path = %path_str, "file created");
        Ok(Self {
            file: Some(file),
            path: path_str,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Explicit close; idempotent. Dropping without calling this also
    /// closes the underlying descriptor.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::info!(path = %self.path, "file closed");
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        self.file.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn create_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.bin");

        let mut handle = FileHandle::create(&path).unwrap();
        assert!(handle.is_open());
        handle.as_file().unwrap().sync_all().ok();
        handle.close();
        assert!(!handle.is_open());

        {
            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .unwrap();
            f.write_all(b"hello").unwrap();
        }

        let reopened = FileHandle::open(&path).unwrap();
        assert!(reopened.is_open());
        assert_eq!(reopened.path(), path.display().to_string());
    }

    #[test]
    fn open_missing_file_is_a_file_error() {
        let err = FileHandle::open("/nonexistent/station-resources-test-path").unwrap_err();
        assert!(matches!(err, StationError::FileError(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test2.bin");
        let mut handle = FileHandle::create(&path).unwrap();
        handle.close();
        handle.close();
        assert!(!handle.is_open());
    }
}
