//! Typed log channels
//!
//! A channel pairs one segment with a fixed line layout. Every layout starts
//! with the same two fields:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0 | 8 | write timestamp (ms since the Unix epoch) |
//! | 8 | 4 | writer thread id |
//!
//! and continues with channel-specific scalars and string slots.

pub mod animation;
pub mod character_base;
pub mod modded_file;

use std::{fmt::Debug, marker::PhantomData, path::Path};

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec,
    error::{CrashLogError, Result},
    segment::{now_millis, SegmentConfig, SegmentReader, SegmentWriter},
};

pub use animation::{AnimationInvocation, AnimationInvocationEntry, AnimationInvocationType};
pub use character_base::{CharacterBaseConstruction, CharacterBaseEntry};
pub use modded_file::{ModdedFileEntry, ModdedFileResolution};

/// Offset of the write timestamp
pub const TIMESTAMP_OFFSET: usize = 0;
/// Offset of the writer thread id
pub const THREAD_ID_OFFSET: usize = 8;
/// First byte available to channel-specific fields
pub const COMMON_FIELDS_END: usize = 12;

/// Width of actor name slots in every channel
pub const NAME_SLOT_WIDTH: usize = 64;

/// Static description of one channel
pub trait ChannelKind: Send + Sync + 'static {
    /// Channel name; also the segment name component and the report key
    const NAME: &'static str;
    /// Line layout version
    const VERSION: u32;
    /// Lines allocated when not configured otherwise
    const DEFAULT_LINE_COUNT: u32;
    /// Bytes per line when not configured otherwise
    const DEFAULT_LINE_CAPACITY: u32;
    /// Smallest line that fits every field of the layout
    const MIN_LINE_CAPACITY: u32;

    /// Decoded form of one line
    type Event: Serialize + DeserializeOwned + Clone + Debug + Send;

    /// Decode a line; never fails, garbage in gives garbage out
    fn decode(line: &[u8], crash_time_ms: i64) -> Self::Event;
}

/// Id of the calling OS thread
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> i32 {
    nix::unistd::gettid().as_raw()
}

/// Id of the calling thread (process-local numbering)
#[cfg(not(target_os = "linux"))]
pub fn current_thread_id() -> i32 {
    use std::sync::atomic::{AtomicI32, Ordering};

    static NEXT_ID: AtomicI32 = AtomicI32::new(1);
    thread_local! {
        static THREAD_ID: i32 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

/// Fields every line starts with, decoded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommonFields {
    /// Seconds between the write and the crash
    pub age: f64,
    pub timestamp: DateTime<Utc>,
    pub thread_id: i32,
}

impl CommonFields {
    /// Decode the shared prefix of a line
    pub fn decode(line: &[u8], crash_time_ms: i64) -> Self {
        let timestamp_ms = codec::decode_i64(line, TIMESTAMP_OFFSET);
        Self {
            age: crash_time_ms.wrapping_sub(timestamp_ms) as f64 / 1000.0,
            timestamp: Utc
                .timestamp_millis_opt(timestamp_ms)
                .single()
                .unwrap_or_default(),
            thread_id: codec::decode_i32(line, THREAD_ID_OFFSET),
        }
    }
}

/// Write side of a channel, used inside the host process
#[derive(Debug)]
pub struct ChannelWriter<K: ChannelKind> {
    segment: SegmentWriter,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ChannelKind> ChannelWriter<K> {
    /// Open the channel's segment for writing
    pub fn open(config: SegmentConfig) -> Result<Self> {
        if config.layout.version != K::VERSION {
            return Err(CrashLogError::invalid_parameter(
                "version",
                format!("{} lines are version {}", K::NAME, K::VERSION),
            ));
        }
        if config.layout.line_capacity < K::MIN_LINE_CAPACITY {
            return Err(CrashLogError::invalid_parameter(
                "line_capacity",
                format!("{} lines need at least {} bytes", K::NAME, K::MIN_LINE_CAPACITY),
            ));
        }

        Ok(Self {
            segment: SegmentWriter::open(config)?,
            _kind: PhantomData,
        })
    }

    /// Segment configuration for this channel with the given dimensions
    pub fn segment_config(
        directory: Option<&Path>,
        name: impl Into<String>,
        line_count: u32,
        line_capacity: u32,
    ) -> SegmentConfig {
        let mut config = SegmentConfig::new(name, K::VERSION, line_count, line_capacity);
        config.directory = directory.map(Path::to_path_buf);
        config
    }

    /// Stamp a line with the common fields and let `fill` write the rest
    ///
    /// Never fails; a superseded write is dropped and logged.
    fn write_with<F>(&self, fill: F)
    where
        F: FnOnce(&mut [u8]),
    {
        let timestamp = now_millis();
        let thread_id = current_thread_id();
        let written = self.segment.write_line(|line| {
            codec::encode_i64(line, TIMESTAMP_OFFSET, timestamp);
            codec::encode_i32(line, THREAD_ID_OFFSET, thread_id);
            fill(line);
        });
        if !written {
            debug!("{} line superseded before it was written", K::NAME);
        }
    }

    /// Underlying segment
    pub fn segment(&self) -> &SegmentWriter {
        &self.segment
    }

    /// Lines written since the segment was created
    pub fn total_written(&self) -> u64 {
        self.segment.total_written()
    }
}

/// Read side of a channel, used by the watchdog
#[derive(Debug)]
pub struct ChannelReader<K: ChannelKind> {
    segment: SegmentReader,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ChannelKind> ChannelReader<K> {
    /// Attach to the channel's segment
    ///
    /// A segment written by another layout version, or with lines too short
    /// for this layout, is reported as `IncompatibleLayout`.
    pub fn open(directory: Option<&Path>, name: &str) -> Result<Self> {
        let segment = SegmentReader::open_read_only(directory, name, K::VERSION)?;
        if segment.layout().line_capacity < K::MIN_LINE_CAPACITY {
            return Err(CrashLogError::incompatible_layout(
                name,
                format!(
                    "{} byte lines cannot hold a {} record",
                    segment.layout().line_capacity,
                    K::NAME
                ),
            ));
        }

        Ok(Self {
            segment,
            _kind: PhantomData,
        })
    }

    /// Decode every live line, most recent first
    pub fn read_all_descending(&self, crash_time_ms: i64) -> Vec<K::Event> {
        self.segment
            .read_all_descending()
            .iter()
            .map(|line| K::decode(&line.bytes, crash_time_ms))
            .collect()
    }

    /// Underlying segment
    pub fn segment(&self) -> &SegmentReader {
        &self.segment
    }

    /// Lines written since the segment was created
    pub fn total_written(&self) -> u64 {
        self.segment.total_written()
    }

    /// Number of live lines
    pub fn current_line_count(&self) -> u64 {
        self.segment.current_line_count()
    }
}
