//! Shared memory region implementation

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    ptr::NonNull,
    time::SystemTime,
};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{CrashLogError, Result};

use super::config::RegionConfig;

/// Metadata describing an open region
#[derive(Debug, Clone)]
pub struct RegionMetadata {
    /// Name of the region
    pub name: String,
    /// Mapped size in bytes
    pub size: usize,
    /// Backing file
    pub path: PathBuf,
    /// Whether this process mapped the region read-only
    pub read_only: bool,
    /// When this process opened the region
    pub opened_at: SystemTime,
}

#[derive(Debug)]
enum Mapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

/// A file-backed shared memory region
#[derive(Debug)]
pub struct SharedMemoryRegion {
    metadata: RegionMetadata,
    /// Keeps the mapping alive; `base` points into it
    _mapping: Mapping,
    base: NonNull<u8>,
    _file: File,
}

impl SharedMemoryRegion {
    /// Create or open a region according to `config`
    pub fn new(config: RegionConfig) -> Result<Self> {
        config.validate()?;

        if config.read_only {
            Self::open_read_only(config)
        } else {
            Self::open_read_write(config)
        }
    }

    fn open_read_write(config: RegionConfig) -> Result<Self> {
        let path = config.path();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create)
            .truncate(false)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| Self::open_error(e, &config.name, &path))?;

        file.set_len(config.size as u64)
            .map_err(|e| CrashLogError::from_io(e, "Failed to set region size"))?;

        let mut mmap = unsafe {
            MmapOptions::new()
                .len(config.size)
                .map_mut(&file)
                .map_err(|e| CrashLogError::from_io(e, "Failed to create memory mapping"))?
        };

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| CrashLogError::invalid_parameter("size", "Empty mapping"))?;

        Ok(Self {
            metadata: RegionMetadata {
                name: config.name,
                size: config.size,
                path,
                read_only: false,
                opened_at: SystemTime::now(),
            },
            _mapping: Mapping::ReadWrite(mmap),
            base,
            _file: file,
        })
    }

    fn open_read_only(config: RegionConfig) -> Result<Self> {
        let path = config.path();

        let file = File::open(&path).map_err(|e| Self::open_error(e, &config.name, &path))?;

        let file_len = file
            .metadata()
            .map_err(|e| CrashLogError::from_io(e, "Failed to stat region file"))?
            .len() as usize;

        let size = if config.size == 0 { file_len } else { config.size };
        if size == 0 || size > file_len {
            return Err(CrashLogError::incompatible_layout(
                &config.name,
                format!("region file holds {} bytes, {} requested", file_len, size),
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(size)
                .map(&file)
                .map_err(|e| CrashLogError::from_io(e, "Failed to create memory mapping"))?
        };

        let base = NonNull::new(mmap.as_ptr() as *mut u8)
            .ok_or_else(|| CrashLogError::invalid_parameter("size", "Empty mapping"))?;

        Ok(Self {
            metadata: RegionMetadata {
                name: config.name,
                size,
                path,
                read_only: true,
                opened_at: SystemTime::now(),
            },
            _mapping: Mapping::ReadOnly(mmap),
            base,
            _file: file,
        })
    }

    fn open_error(err: std::io::Error, name: &str, path: &Path) -> CrashLogError {
        if err.kind() == ErrorKind::NotFound {
            CrashLogError::segment_not_found(name, path)
        } else {
            CrashLogError::from_io(err, "Failed to open region file")
        }
    }

    /// Read up to `len` leading bytes of an existing region file
    ///
    /// Returns `None` when the file does not exist. Used to inspect a
    /// previous layout before resizing the file.
    pub fn read_existing_prefix(config: &RegionConfig, len: usize) -> Result<Option<Vec<u8>>> {
        let path = config.path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CrashLogError::from_io(e, "Failed to open region file")),
        };

        let mut prefix = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| CrashLogError::from_io(e, "Failed to read region file"))?;
        Ok(Some(prefix))
    }

    /// Get the region metadata
    pub fn metadata(&self) -> &RegionMetadata {
        &self.metadata
    }

    /// Get the raw memory slice (read-only)
    ///
    /// Only meaningful while nothing else writes the region; concurrent
    /// writers must be coordinated through the atomics inside it.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.metadata.size) }
    }

    /// Get a typed pointer to the start of the region
    pub fn as_ptr<T>(&self) -> *const T {
        self.base.as_ptr() as *const T
    }

    /// Get a mutable typed pointer usable from shared references
    ///
    /// # Safety
    /// The region must have been mapped read-write, and the caller must
    /// ensure writes through the pointer do not race with other accesses.
    pub unsafe fn as_mut_ptr_unsafe<T>(&self) -> *mut T {
        debug_assert!(!self.metadata.read_only, "write pointer on read-only region");
        self.base.as_ptr() as *mut T
    }

    /// Get the size of the region
    pub fn size(&self) -> usize {
        self.metadata.size
    }

    /// Get the name of the region
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.metadata.path
    }

    /// Whether the region was mapped read-only
    pub fn is_read_only(&self) -> bool {
        self.metadata.read_only
    }

    /// Flush changes to the backing file
    pub fn flush(&self) -> Result<()> {
        match &self._mapping {
            Mapping::ReadWrite(mmap) => mmap
                .flush()
                .map_err(|e| CrashLogError::from_io(e, "Failed to flush memory mapping")),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    /// Remove the backing file; the mapping stays valid until dropped
    pub fn unlink(&self) -> Result<()> {
        match fs::remove_file(&self.metadata.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CrashLogError::from_io(e, "Failed to remove region file")),
        }
    }
}

unsafe impl Send for SharedMemoryRegion {}
unsafe impl Sync for SharedMemoryRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_reopen_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let config = RegionConfig::new("region", 4096).with_directory(temp_dir.path());

        let region = SharedMemoryRegion::new(config).unwrap();
        assert_eq!(region.size(), 4096);
        unsafe {
            let ptr = region.as_mut_ptr_unsafe::<u8>();
            *ptr = 42;
            *ptr.add(1) = 24;
        }

        let reader = SharedMemoryRegion::new(
            RegionConfig::read_only("region").with_directory(temp_dir.path()),
        )
        .unwrap();
        assert!(reader.is_read_only());
        assert_eq!(reader.size(), 4096);
        assert_eq!(&reader.as_slice()[..2], &[42, 24]);
    }

    #[test]
    fn test_missing_region_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = SharedMemoryRegion::new(
            RegionConfig::read_only("missing").with_directory(temp_dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, CrashLogError::SegmentNotFound { .. }));

        let prefix = SharedMemoryRegion::read_existing_prefix(
            &RegionConfig::new("missing", 64).with_directory(temp_dir.path()),
            64,
        )
        .unwrap();
        assert!(prefix.is_none());
    }

    #[test]
    fn test_unlink_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = RegionConfig::new("gone", 128).with_directory(temp_dir.path());
        let region = SharedMemoryRegion::new(config).unwrap();
        assert!(region.path().exists());
        region.unlink().unwrap();
        assert!(!region.path().exists());
        region.unlink().unwrap();
    }
}
