use std::os::fd::AsFd;

use memmap2::MmapMut;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use station_core::StationError;

/// A POSIX shared-memory segment: `shm_open` + `ftruncate` + `mmap`, via
/// `nix` for the syscalls and `memmap2` for the mapping itself.
pub struct SharedMemorySegment {
    name: String,
    mapping: Option<MmapMut>,
    owner: bool,
}

impl SharedMemorySegment {
    /// Creates a new segment of `size` bytes, owned by this process (the
    /// object is unlinked from the filesystem namespace on drop).
    pub fn create(name: &str, size: usize) -> Result<Self, StationError> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|e| StationError::SharedMemoryError(format!("shm_open({name}): {e}")))?;

        ftruncate(fd.as_fd(), size as i64)
            .map_err(|e| StationError::SharedMemoryError(format!("ftruncate({name}): {e}")))?;

        let mapping = unsafe { MmapMut::map_mut(&fd) }
            .map_err(|e| StationError::SharedMemoryError(format!("mmap({name}): {e}")))?;

        tracing::info!(name, size, "shared memory segment created");
        Ok(Self {
            name: name.to_string(),
            mapping: Some(mapping),
            owner: true,
        })
    }

    /// Attaches to an existing segment another process created.
    pub fn attach(name: &str) -> Result<Self, StationError> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|e| StationError::SharedMemoryError(format!("shm_open({name}): {e}")))?;

        let mapping = unsafe { MmapMut::map_mut(&fd) }
            .map_err(|e| StationError::SharedMemoryError(format!("mmap({name}): {e}")))?;

        tracing::info!(name, "shared memory segment attached");
        Ok(Self {
            name: name.to_string(),
            mapping: Some(mapping),
            owner: false,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mapping.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.mapping.as_deref_mut().unwrap_or(&mut [])
    }

    pub fn len(&self) -> usize {
        self.mapping.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SharedMemorySegment {
    fn drop(&mut self) {
        self.mapping.take();
        if self.owner {
            let _ = shm_unlink(self.name.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/station-resources-test-{tag}-{}", std::process::id())
    }

    #[test]
    fn create_writes_and_reads_back() {
        let name = unique_name("rw");
        let mut seg = SharedMemorySegment::create(&name, 4096).unwrap();
        assert_eq!(seg.len(), 4096);
        seg.as_mut_slice()[0..5].copy_from_slice(b"hello");
        assert_eq!(&seg.as_slice()[0..5], b"hello");
    }

    #[test]
    fn attach_sees_the_creators_writes() {
        let name = unique_name("attach");
        let mut creator = SharedMemorySegment::create(&name, 4096).unwrap();
        creator.as_mut_slice()[0..5].copy_from_slice(b"world");

        let attached = SharedMemorySegment::attach(&name).unwrap();
        assert_eq!(&attached.as_slice()[0..5], b"world");
    }

    #[test]
    fn create_twice_with_same_name_fails() {
        let name = unique_name("dup");
        let _first = SharedMemorySegment::create(&name, 64).unwrap();
        let second = SharedMemorySegment::create(&name, 64);
        assert!(matches!(second, Err(StationError::SharedMemoryError(_))));
    }

    #[test]
    fn drop_unlinks_owned_segment() {
        let name = unique_name("unlink");
        {
            let _seg = SharedMemorySegment::create(&name, 64).unwrap();
        }
        // the name should be free again; attaching now must fail.
        assert!(SharedMemorySegment::attach(&name).is_err());
    }
}
