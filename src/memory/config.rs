//! Configuration types for shared memory regions

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CrashLogError, Result};

/// Directory used for region files when none is configured
///
/// `/dev/shm` keeps the pages in memory on Linux; other platforms fall back
/// to the temp directory, which any process of the same user can open.
pub fn default_shm_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm = Path::new("/dev/shm");
        if shm.is_dir() {
            return shm.to_path_buf();
        }
    }
    std::env::temp_dir()
}

/// Configuration for creating or attaching to a shared memory region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Name of the shared memory region, also the file name
    pub name: String,
    /// Total size of the region in bytes (0 maps a read-only file whole)
    pub size: usize,
    /// Directory holding the region file
    pub directory: Option<PathBuf>,
    /// Whether to create the region if it doesn't exist
    pub create: bool,
    /// Map the region read-only
    pub read_only: bool,
    /// Permissions for newly created region files (Unix permissions)
    pub permissions: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            directory: None,
            create: true,
            read_only: false,
            permissions: 0o644,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Configuration for attaching read-only to an existing region
    pub fn read_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: false,
            read_only: true,
            ..Default::default()
        }
    }

    /// Set the directory holding the region file
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set whether to create the region if it doesn't exist
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the permissions for the region
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CrashLogError::invalid_parameter(
                "name",
                "Region name cannot be empty",
            ));
        }

        if self.name.contains(['/', '\\', '\0']) || self.name == "." || self.name == ".." {
            return Err(CrashLogError::invalid_parameter(
                "name",
                format!("Region name {:?} is not a valid file name", self.name),
            ));
        }

        if !self.read_only && self.size == 0 {
            return Err(CrashLogError::invalid_parameter(
                "size",
                "Region size must be greater than 0",
            ));
        }

        if self.read_only && self.create {
            return Err(CrashLogError::invalid_parameter(
                "create",
                "A read-only region cannot be created",
            ));
        }

        Ok(())
    }

    /// Full path of the region file
    pub fn path(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(default_shm_dir)
            .join(&self.name)
    }
}
