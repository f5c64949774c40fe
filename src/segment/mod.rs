//! Shared circular log store
//!
//! A segment is one named, versioned file mapping laid out as:
//!
//! ```text
//! ┌──────────────┬──────────────────────┬─────────┬─────────┬─────┐
//! │ header (64B) │ lock table (8B/line) │ line 0  │ line 1  │ ... │
//! └──────────────┴──────────────────────┴─────────┴─────────┴─────┘
//! ```
//!
//! The header's `total_written` counter hands out tickets; ticket `t` lands
//! on line `(t - 1) % line_count`. Old lines are overwritten once the
//! counter wraps past `line_count`.

pub mod constants;
pub mod header;
pub mod store;


pub use constants::*;
pub use header::{HeaderSnapshot, SegmentHeader, SegmentLayout};
pub use store::{now_millis, LineGuard, LineSnapshot, SegmentConfig, SegmentReader, SegmentWriter};
