//! Segment header and layout arithmetic

use std::sync::atomic::AtomicU64;

use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::codec;
use crate::error::{CrashLogError, Result};

/// Header at the start of every segment
///
/// Everything except `magic` and `total_written` is written once, before
/// `magic` is published with release ordering.
#[repr(C)]
pub struct SegmentHeader {
    /// Magic number, written last during initialization
    pub magic: AtomicU64,
    /// Record layout version of the owning channel
    pub version: u32,
    /// Number of line slots
    pub line_count: u32,
    /// Bytes per line
    pub line_capacity: u32,
    /// Offset of the first data line
    pub data_offset: u32,
    /// Writes since creation; never decremented
    pub total_written: AtomicU64,
    /// Creation timestamp (milliseconds since the Unix epoch)
    pub created_at_ms: i64,
    /// Process that created the segment
    pub owner_pid: u32,
    _reserved: [u8; 20],
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() == HEADER_SIZE);

impl SegmentHeader {
    /// Header for a freshly created segment, magic still unset
    pub fn new(layout: &SegmentLayout, created_at_ms: i64) -> Self {
        Self {
            magic: AtomicU64::new(0),
            version: layout.version,
            line_count: layout.line_count,
            line_capacity: layout.line_capacity,
            data_offset: layout.data_offset() as u32,
            total_written: AtomicU64::new(0),
            created_at_ms,
            owner_pid: std::process::id(),
            _reserved: [0; 20],
        }
    }
}

/// The dimensions a reader and writer must agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLayout {
    pub version: u32,
    pub line_count: u32,
    pub line_capacity: u32,
}

impl SegmentLayout {
    pub fn new(version: u32, line_count: u32, line_capacity: u32) -> Self {
        Self {
            version,
            line_count,
            line_capacity,
        }
    }

    /// Validate the dimensions
    pub fn validate(&self) -> Result<()> {
        if self.line_count == 0 || self.line_count > MAX_LINE_COUNT {
            return Err(CrashLogError::invalid_parameter(
                "line_count",
                format!("must be between 1 and {}", MAX_LINE_COUNT),
            ));
        }
        if self.line_capacity < MIN_LINE_CAPACITY || self.line_capacity > MAX_LINE_CAPACITY {
            return Err(CrashLogError::invalid_parameter(
                "line_capacity",
                format!(
                    "must be between {} and {}",
                    MIN_LINE_CAPACITY, MAX_LINE_CAPACITY
                ),
            ));
        }
        Ok(())
    }

    /// Offset of the lock table
    pub fn lock_table_offset(&self) -> usize {
        HEADER_SIZE
    }

    /// Offset of the first data line
    pub fn data_offset(&self) -> usize {
        let locks_end = HEADER_SIZE + self.line_count as usize * LOCK_WORD_SIZE;
        (locks_end + DATA_ALIGNMENT - 1) & !(DATA_ALIGNMENT - 1)
    }

    /// Total bytes needed for the segment
    pub fn total_size(&self) -> usize {
        self.data_offset() + self.line_count as usize * self.line_capacity as usize
    }
}

/// Plain copy of a header's fields, decoded from raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSnapshot {
    pub magic: u64,
    pub version: u32,
    pub line_count: u32,
    pub line_capacity: u32,
    pub data_offset: u32,
    pub total_written: u64,
    pub created_at_ms: i64,
    pub owner_pid: u32,
}

impl HeaderSnapshot {
    /// Decode the header fields; `None` if fewer than `HEADER_SIZE` bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: codec::decode_u64(bytes, 0),
            version: codec::decode_u32(bytes, 8),
            line_count: codec::decode_u32(bytes, 12),
            line_capacity: codec::decode_u32(bytes, 16),
            data_offset: codec::decode_u32(bytes, 20),
            total_written: codec::decode_u64(bytes, 24),
            created_at_ms: codec::decode_i64(bytes, 32),
            owner_pid: codec::decode_u32(bytes, 40),
        })
    }

    /// Layout recorded in the header
    pub fn layout(&self) -> SegmentLayout {
        SegmentLayout::new(self.version, self.line_count, self.line_capacity)
    }

    /// Check that the header describes an initialized segment of `version`
    /// whose recorded dimensions are self-consistent
    pub fn validate(&self, name: &str, version: u32) -> Result<SegmentLayout> {
        if self.magic != SEGMENT_MAGIC {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!("bad magic {:#018x}", self.magic),
            ));
        }
        if self.version != version {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!("version {} does not match expected {}", self.version, version),
            ));
        }

        let layout = self.layout();
        layout
            .validate()
            .map_err(|e| CrashLogError::incompatible_layout(name, e.to_string()))?;

        if self.data_offset as usize != layout.data_offset() {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!(
                    "data offset {} does not match computed {}",
                    self.data_offset,
                    layout.data_offset()
                ),
            ));
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &SegmentHeader, magic: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        codec::encode_u64(&mut bytes, 0, magic);
        codec::encode_u32(&mut bytes, 8, header.version);
        codec::encode_u32(&mut bytes, 12, header.line_count);
        codec::encode_u32(&mut bytes, 16, header.line_capacity);
        codec::encode_u32(&mut bytes, 20, header.data_offset);
        codec::encode_i64(&mut bytes, 32, header.created_at_ms);
        codec::encode_u32(&mut bytes, 40, header.owner_pid);
        bytes
    }

    #[test]
    fn test_layout_arithmetic() {
        let layout = SegmentLayout::new(1, 64, 256);
        // 64 + 64 * 8 = 576, already 64-aligned
        assert_eq!(layout.data_offset(), 576);
        assert_eq!(layout.total_size(), 576 + 64 * 256);

        let odd = SegmentLayout::new(1, 3, 100);
        assert_eq!(odd.data_offset(), 128);
        assert_eq!(odd.data_offset() % DATA_ALIGNMENT, 0);
    }

    #[test]
    fn test_layout_validation() {
        assert!(SegmentLayout::new(1, 0, 256).validate().is_err());
        assert!(SegmentLayout::new(1, 8, 4).validate().is_err());
        assert!(SegmentLayout::new(1, 8, MAX_LINE_CAPACITY + 1).validate().is_err());
        assert!(SegmentLayout::new(1, 8, 256).validate().is_ok());
    }

    #[test]
    fn test_snapshot_validation() {
        let layout = SegmentLayout::new(3, 10, 512);
        let header = SegmentHeader::new(&layout, 1_000);

        let bytes = encode(&header, SEGMENT_MAGIC);
        let snapshot = HeaderSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.validate("seg", 3).unwrap(), layout);
        assert!(snapshot.validate("seg", 2).is_err());

        let foreign = HeaderSnapshot::from_bytes(&encode(&header, 0x1234)).unwrap();
        assert!(foreign.validate("seg", 3).is_err());

        assert!(HeaderSnapshot::from_bytes(&bytes[..HEADER_SIZE - 1]).is_none());
    }
}
