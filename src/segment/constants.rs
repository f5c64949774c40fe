//! Constants for the segment layout

/// Magic number identifying an initialized segment ("CRSHRING")
pub const SEGMENT_MAGIC: u64 = u64::from_le_bytes(*b"CRSHRING");

/// Size of the segment header at offset 0
pub const HEADER_SIZE: usize = 64;

/// Size of one line's lock word
pub const LOCK_WORD_SIZE: usize = 8;

/// Alignment of the first data line
pub const DATA_ALIGNMENT: usize = 64;

/// Largest supported line count
pub const MAX_LINE_COUNT: u32 = 1 << 20;

/// Smallest line that still holds a timestamp and a thread id
pub const MIN_LINE_CAPACITY: u32 = 16;

/// Largest supported line; string slot prefixes are 16-bit
pub const MAX_LINE_CAPACITY: u32 = 1 << 16;
