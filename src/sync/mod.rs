//! Synchronization primitives shared between writer threads and reader processes
//!
//! Key features:
//! - One lock word per line, stored in the shared segment itself
//! - Writers serialize only when they land on the same physical line
//! - Readers never block on a writer; they validate their copy instead

pub mod line_lock;

pub use line_lock::{LineLock, SlotRead, Ticket, DEFAULT_READ_RETRIES};
