//! Writer and reader handles over a segment

use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, info};

use crate::{
    error::{CrashLogError, Result},
    memory::{RegionConfig, SharedMemoryRegion},
    sync::{LineLock, SlotRead, Ticket, DEFAULT_READ_RETRIES},
};

use super::{
    constants::*,
    header::{HeaderSnapshot, SegmentHeader, SegmentLayout},
};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Configuration for opening a segment as its writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Segment name, shared by writer and readers
    pub name: String,
    /// Directory holding the segment file (default: `default_shm_dir()`)
    pub directory: Option<PathBuf>,
    /// Dimensions and version
    pub layout: SegmentLayout,
    /// Permissions for the segment file
    pub permissions: u32,
}

impl SegmentConfig {
    /// Create a new segment configuration
    pub fn new(name: impl Into<String>, version: u32, line_count: u32, line_capacity: u32) -> Self {
        Self {
            name: name.into(),
            directory: None,
            layout: SegmentLayout::new(version, line_count, line_capacity),
            permissions: 0o644,
        }
    }

    /// Set the directory holding the segment file
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the permissions of the segment file
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.region_config().validate()
    }

    fn region_config(&self) -> RegionConfig {
        let mut config = RegionConfig::new(&self.name, self.layout.total_size())
            .with_permissions(self.permissions);
        config.directory = self.directory.clone();
        config
    }
}

/// Mapped segment shared by the writer and reader handles
#[derive(Debug)]
struct SegmentView {
    region: SharedMemoryRegion,
    layout: SegmentLayout,
}

impl SegmentView {
    fn header(&self) -> &SegmentHeader {
        unsafe { &*self.region.as_ptr::<SegmentHeader>() }
    }

    fn lock(&self, slot: usize) -> LineLock<'_> {
        debug_assert!(slot < self.layout.line_count as usize);
        let offset = self.layout.lock_table_offset() + slot * LOCK_WORD_SIZE;
        let word = unsafe { &*(self.region.as_ptr::<u8>().add(offset) as *const AtomicU64) };
        LineLock::new(word)
    }

    fn line_ptr(&self, slot: usize) -> *const u8 {
        debug_assert!(slot < self.layout.line_count as usize);
        let offset = self.layout.data_offset() + slot * self.layout.line_capacity as usize;
        unsafe { self.region.as_ptr::<u8>().add(offset) }
    }

    fn slot_of(&self, ticket: Ticket) -> usize {
        ((ticket - 1) % self.layout.line_count as u64) as usize
    }

    fn total_written(&self) -> u64 {
        self.header().total_written.load(Ordering::Acquire)
    }

    fn current_line_count(&self) -> u64 {
        self.total_written().min(self.layout.line_count as u64)
    }

    fn header_snapshot(&self) -> Option<HeaderSnapshot> {
        HeaderSnapshot::from_bytes(self.region.as_slice())
    }

    /// Copy the line holding `ticket` into `buf`
    fn read_ticket(&self, ticket: Ticket, buf: &mut [u8]) -> SlotRead {
        let slot = self.slot_of(ticket);
        let capacity = self.layout.line_capacity as usize;
        debug_assert_eq!(buf.len(), capacity);
        let src = self.line_ptr(slot);
        self.lock(slot).read_with(
            || unsafe { std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), capacity) },
            DEFAULT_READ_RETRIES,
        )
    }

    /// Ticket of the line at logical `index` (0 = oldest live line)
    fn ticket_at(&self, total: u64, index: u64) -> Ticket {
        let current = total.min(self.layout.line_count as u64);
        total - current + index + 1
    }

    fn read_line(&self, index: usize) -> Result<Vec<u8>> {
        let total = self.total_written();
        let current = total.min(self.layout.line_count as u64);
        if index as u64 >= current {
            return Err(CrashLogError::invalid_parameter(
                "index",
                format!("line {} out of range, {} lines available", index, current),
            ));
        }

        let mut line = vec![0u8; self.layout.line_capacity as usize];
        let read = self.read_ticket(self.ticket_at(total, index as u64), &mut line);
        if !read.consistent {
            debug!("Line {} of {} may be torn", index, self.region.name());
        }
        Ok(line)
    }

    fn read_all_descending(&self) -> Vec<LineSnapshot> {
        let total = self.total_written();
        let current = total.min(self.layout.line_count as u64);
        let capacity = self.layout.line_capacity as usize;

        (0..current)
            .rev()
            .map(|index| {
                let expected = self.ticket_at(total, index);
                let mut bytes = vec![0u8; capacity];
                let read = self.read_ticket(expected, &mut bytes);
                LineSnapshot {
                    ticket: read.ticket,
                    expected_ticket: expected,
                    consistent: read.consistent,
                    bytes,
                }
            })
            .collect()
    }
}

/// One line copied out of a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
    /// Ticket recorded in the line's lock word
    pub ticket: Ticket,
    /// Ticket the line should hold given the write counter
    pub expected_ticket: Ticket,
    /// False if the copy may be torn
    pub consistent: bool,
    /// Raw line bytes
    pub bytes: Vec<u8>,
}

impl LineSnapshot {
    /// Whether the line holds the write the counter says it should
    ///
    /// A mismatch means the claimant of this slot had not committed yet (or
    /// died), so the bytes belong to an older write.
    pub fn is_current(&self) -> bool {
        self.consistent && self.ticket == self.expected_ticket
    }
}

/// Writer handle: the host process's view of a segment
#[derive(Debug)]
pub struct SegmentWriter {
    view: SegmentView,
}

impl SegmentWriter {
    /// Create the segment, or reinitialize an existing one with the same layout
    ///
    /// An existing segment with another version or other dimensions is left
    /// untouched and reported as `IncompatibleLayout`.
    pub fn open(config: SegmentConfig) -> Result<Self> {
        config.validate()?;

        let region_config = config.region_config();
        if let Some(prefix) = SharedMemoryRegion::read_existing_prefix(&region_config, HEADER_SIZE)? {
            Self::check_existing(&config.name, &config.layout, &prefix)?;
        }

        let region = SharedMemoryRegion::new(region_config)?;
        let view = SegmentView {
            region,
            layout: config.layout,
        };
        Self::initialize(&view);

        info!(
            "Opened segment {} (v{}, {} lines x {} bytes) at {}",
            config.name,
            config.layout.version,
            config.layout.line_count,
            config.layout.line_capacity,
            view.region.path().display()
        );

        Ok(Self { view })
    }

    fn check_existing(name: &str, layout: &SegmentLayout, prefix: &[u8]) -> Result<()> {
        let Some(snapshot) = HeaderSnapshot::from_bytes(prefix) else {
            if prefix.iter().all(|&b| b == 0) {
                return Ok(());
            }
            return Err(CrashLogError::incompatible_layout(
                name,
                "existing file is too short to hold a segment header",
            ));
        };

        // Created but never initialized
        if snapshot.magic == 0 {
            return Ok(());
        }

        let existing = snapshot.validate(name, layout.version)?;
        if existing != *layout {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!(
                    "existing segment has {} lines x {} bytes, expected {} x {}",
                    existing.line_count,
                    existing.line_capacity,
                    layout.line_count,
                    layout.line_capacity
                ),
            ));
        }
        Ok(())
    }

    fn initialize(view: &SegmentView) {
        let size = view.region.size();
        unsafe {
            let base = view.region.as_mut_ptr_unsafe::<u8>();
            std::ptr::write_bytes(base, 0, size);
            std::ptr::write(
                base as *mut SegmentHeader,
                SegmentHeader::new(&view.layout, now_millis()),
            );
        }
        view.header().magic.store(SEGMENT_MAGIC, Ordering::Release);
    }

    /// Claim the next line and lock it for writing
    ///
    /// The write counter advances exactly once per call. Returns `None` if a
    /// later write already landed on the same physical line while this one
    /// waited for the lock; the older record is dropped.
    pub fn claim_line(&self) -> Option<LineGuard<'_>> {
        let ticket = self.view.header().total_written.fetch_add(1, Ordering::AcqRel) + 1;
        let slot = self.view.slot_of(ticket);
        let lock = self.view.lock(slot);

        if !lock.acquire(ticket) {
            return None;
        }

        let capacity = self.view.layout.line_capacity as usize;
        let line = unsafe {
            let ptr = self.view.line_ptr(slot) as *mut u8;
            std::slice::from_raw_parts_mut(ptr, capacity)
        };

        Some(LineGuard {
            lock,
            slot,
            ticket,
            line,
        })
    }

    /// Claim a line, zero it, and fill it with `fill`
    ///
    /// Returns `false` if the write was superseded (see [`claim_line`](Self::claim_line)).
    pub fn write_line<F>(&self, fill: F) -> bool
    where
        F: FnOnce(&mut [u8]),
    {
        match self.claim_line() {
            Some(mut guard) => {
                guard.fill(0);
                fill(&mut guard);
                true
            }
            None => false,
        }
    }

    /// Number of live, readable lines
    pub fn current_line_count(&self) -> u64 {
        self.view.current_line_count()
    }

    /// Writes since the segment was created
    pub fn total_written(&self) -> u64 {
        self.view.total_written()
    }

    /// Copy the line at logical `index` (0 = oldest)
    pub fn read_line(&self, index: usize) -> Result<Vec<u8>> {
        self.view.read_line(index)
    }

    /// Segment dimensions
    pub fn layout(&self) -> SegmentLayout {
        self.view.layout
    }

    /// Segment name
    pub fn name(&self) -> &str {
        self.view.region.name()
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        self.view.region.path()
    }

    /// Creation time of the segment
    pub fn created_at_ms(&self) -> i64 {
        self.view.header().created_at_ms
    }

    /// Flush the segment to its backing file
    pub fn flush(&self) -> Result<()> {
        self.view.region.flush()
    }

    /// Remove the segment's backing file (clean shutdown)
    ///
    /// The mapping stays usable until the handle is dropped.
    pub fn unlink(&self) -> Result<()> {
        self.view.region.unlink()?;
        info!("Removed segment {}", self.name());
        Ok(())
    }
}

/// Exclusive access to one claimed line
///
/// Dereferences to the line's bytes. Dropping the guard publishes the line
/// and releases its lock, on every exit path.
pub struct LineGuard<'a> {
    lock: LineLock<'a>,
    slot: usize,
    ticket: Ticket,
    line: &'a mut [u8],
}

impl<'a> LineGuard<'a> {
    /// Physical slot of the claimed line
    pub fn index(&self) -> usize {
        self.slot
    }

    /// 1-based write number of this line
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }
}

impl Deref for LineGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.line
    }
}

impl DerefMut for LineGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.line
    }
}

impl Drop for LineGuard<'_> {
    fn drop(&mut self) {
        self.lock.commit(self.ticket);
    }
}

/// Read-only handle: the watchdog's view of a segment
#[derive(Debug)]
pub struct SegmentReader {
    view: SegmentView,
    header: HeaderSnapshot,
}

impl SegmentReader {
    /// Attach read-only to an existing segment of `version`
    ///
    /// Fails with `SegmentNotFound` if nothing was ever created under `name`
    /// and with `IncompatibleLayout` if the segment's version or size do not
    /// match what this build expects.
    pub fn open_read_only(directory: Option<&Path>, name: &str, version: u32) -> Result<Self> {
        let mut region_config = RegionConfig::read_only(name);
        region_config.directory = directory.map(Path::to_path_buf);

        let region = SharedMemoryRegion::new(region_config)?;
        if region.size() < HEADER_SIZE {
            return Err(CrashLogError::incompatible_layout(
                name,
                "file is too short to hold a segment header",
            ));
        }

        // Publishes the rest of the header
        let magic = unsafe { &*region.as_ptr::<SegmentHeader>() }
            .magic
            .load(Ordering::Acquire);
        if magic != SEGMENT_MAGIC {
            return Err(CrashLogError::incompatible_layout(
                name,
                "segment is not initialized",
            ));
        }

        let header = HeaderSnapshot::from_bytes(region.as_slice()).ok_or_else(|| {
            CrashLogError::incompatible_layout(name, "file is too short to hold a segment header")
        })?;
        let layout = header.validate(name, version)?;

        if layout.total_size() > region.size() {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!(
                    "segment needs {} bytes but the file holds {}",
                    layout.total_size(),
                    region.size()
                ),
            ));
        }

        debug!(
            "Attached to segment {} (v{}, {} lines x {} bytes)",
            name, layout.version, layout.line_count, layout.line_capacity
        );

        Ok(Self {
            view: SegmentView { region, layout },
            header,
        })
    }

    /// Number of live, readable lines
    pub fn current_line_count(&self) -> u64 {
        self.view.current_line_count()
    }

    /// Writes since the segment was created
    pub fn total_written(&self) -> u64 {
        self.view.total_written()
    }

    /// Copy the line at logical `index` (0 = oldest)
    pub fn read_line(&self, index: usize) -> Result<Vec<u8>> {
        self.view.read_line(index)
    }

    /// Copy every live line, most recent first
    pub fn read_all_descending(&self) -> Vec<LineSnapshot> {
        self.view.read_all_descending()
    }

    /// Segment dimensions as recorded by the writer
    pub fn layout(&self) -> SegmentLayout {
        self.view.layout
    }

    /// Segment name
    pub fn name(&self) -> &str {
        self.view.region.name()
    }

    /// Creation time of the segment
    pub fn created_at_ms(&self) -> i64 {
        self.header.created_at_ms
    }

    /// Process that created the segment
    pub fn owner_pid(&self) -> u32 {
        self.header.owner_pid
    }

    /// Header fields as they were when the reader attached
    pub fn header(&self) -> HeaderSnapshot {
        self.view.header_snapshot().unwrap_or(self.header)
    }
}
