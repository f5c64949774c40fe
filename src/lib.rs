//! # crashring - shared-memory crash logs
//!
//! crashring keeps the most recent events of a host process in named,
//! fixed-size shared-memory segments so that a separate watchdog process can
//! read them after the host crashes, without any IPC handshake.
//!
//! ## Features
//!
//! - **Circular segments**: fixed number of fixed-width lines, oldest overwritten
//! - **Per-line locking**: writer threads only contend on the same physical line
//! - **Crash-tolerant reads**: readers never wait on a writer that may be dead
//! - **Versioned layouts**: mismatched builds see an absent channel, never garbage
//! - **Typed channels**: animation invocations, character bases, modded files
//! - **JSON reports**: most-recent-first records with ages relative to the crash
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────── host process ────────────────┐
//! │  hooks ──► CrashLogWriter ──► ChannelWriter  │
//! │                                   │          │
//! └───────────────────────────────────┼──────────┘
//!                                     ▼
//!               /dev/shm/<prefix>.<Channel>.<pid>
//!                                     │
//! ┌───────────────────────────────────┼──────────┐
//! │  CrashLogReader ◄── ChannelReader ◄┘         │
//! │        │                                     │
//! │        ▼                                     │
//! │   CrashReport (JSON)      watchdog process   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod channels;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod report;
pub mod segment;
pub mod sync;

// Main API re-exports
pub use aggregator::{CrashLogReader, CrashLogWriter};
pub use channels::{
    AnimationInvocation, AnimationInvocationEntry, AnimationInvocationType, ChannelKind,
    ChannelReader, ChannelWriter, CharacterBaseConstruction, CharacterBaseEntry, ModdedFileEntry,
    ModdedFileResolution,
};
pub use config::{ChannelConfig, LogConfig};
pub use error::{CrashLogError, Result};
pub use memory::{RegionConfig, SharedMemoryRegion};
pub use report::{ChannelSection, CrashReport, ProcessInfo};
pub use segment::{LineGuard, SegmentConfig, SegmentLayout, SegmentReader, SegmentWriter};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
