//! Named, file-backed shared memory regions

pub mod config;
pub mod regions;

pub use config::{default_shm_dir, RegionConfig};
pub use regions::{RegionMetadata, SharedMemoryRegion};
