//! Per-line lock words living inside a segment
//!
//! Each line owns one 64-bit word in the segment's lock table:
//!
//! ```text
//!  63                                   1   0
//! ┌──────────────────────────────────────┬───┐
//! │ ticket of the last committed write   │ L │
//! └──────────────────────────────────────┴───┘
//! ```
//!
//! Writers inside the host process take the `L` bit with a compare-exchange,
//! copy one line, and store the new ticket with the bit cleared. Readers in
//! another process only ever load the word: they cannot take the lock (their
//! mapping is read-only) and must not wait on a writer that may be dead, so
//! they use the word as a sequence check around their copy instead.

use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Ticket number of a write (1-based position in the segment's history)
pub type Ticket = u64;

const LOCKED: u64 = 1;

/// Spins before yielding to the scheduler
const SPINS_BEFORE_YIELD: u32 = 64;

/// Default number of attempts a reader makes before accepting a torn copy
pub const DEFAULT_READ_RETRIES: usize = 128;

#[inline]
fn backoff(spins: &mut u32) {
    if *spins < SPINS_BEFORE_YIELD {
        std::hint::spin_loop();
        *spins += 1;
    } else {
        std::thread::yield_now();
    }
}

/// Ticket stored in a lock word
#[inline]
pub fn ticket_of(word: u64) -> Ticket {
    word >> 1
}

/// Whether a lock word has its lock bit set
#[inline]
pub fn is_locked(word: u64) -> bool {
    word & LOCKED != 0
}

/// Outcome of a reader's copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRead {
    /// Ticket of the write the copy belongs to (0 if never written)
    pub ticket: Ticket,
    /// False when the retries ran out and the bytes may be torn
    pub consistent: bool,
}

/// View over one line's lock word
#[derive(Debug, Clone, Copy)]
pub struct LineLock<'a> {
    word: &'a AtomicU64,
}

impl<'a> LineLock<'a> {
    /// Wrap a lock word
    pub fn new(word: &'a AtomicU64) -> Self {
        Self { word }
    }

    /// Raw word value
    pub fn load(&self) -> u64 {
        self.word.load(Ordering::Acquire)
    }

    /// Acquire the line for writing `ticket`
    ///
    /// Returns `false` without taking the lock if a newer ticket has already
    /// been committed to this line while we waited: the slot belongs to a
    /// later write and must not be overwritten with older data.
    pub fn acquire(&self, ticket: Ticket) -> bool {
        let mut spins = 0;
        loop {
            let current = self.word.load(Ordering::Acquire);
            if !is_locked(current) {
                if ticket_of(current) > ticket {
                    return false;
                }
                if self
                    .word
                    .compare_exchange_weak(
                        current,
                        current | LOCKED,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return true;
                }
            }
            backoff(&mut spins);
        }
    }

    /// Publish `ticket` as the line's content and release the lock
    pub fn commit(&self, ticket: Ticket) {
        self.word.store(ticket << 1, Ordering::Release);
    }

    /// Reset the word to "never written, unlocked"
    pub fn reset(&self) {
        self.word.store(0, Ordering::Release);
    }

    /// Copy the line with a sequence check, retrying up to `max_retries`
    ///
    /// `copy` is called once per attempt. If every attempt overlaps a write
    /// (or the writer died holding the lock) the last copy is kept and the
    /// result is marked inconsistent rather than blocking.
    pub fn read_with<F>(&self, mut copy: F, max_retries: usize) -> SlotRead
    where
        F: FnMut(),
    {
        let mut spins = 0;
        for _ in 0..max_retries {
            let before = self.word.load(Ordering::Acquire);
            if is_locked(before) {
                backoff(&mut spins);
                continue;
            }

            copy();
            fence(Ordering::Acquire);

            let after = self.word.load(Ordering::Relaxed);
            if before == after {
                return SlotRead {
                    ticket: ticket_of(before),
                    consistent: true,
                };
            }
            backoff(&mut spins);
        }

        copy();
        SlotRead {
            ticket: ticket_of(self.word.load(Ordering::Acquire)),
            consistent: false,
        }
    }
}
