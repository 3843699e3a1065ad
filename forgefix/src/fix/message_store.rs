//! Common contract every message-store backend satisfies (spec.md §4.8): persist outgoing
//! messages keyed by sequence number, track both peers' next sequence numbers, and record when
//! the session's counters were last reset. `Store` (sqlite-backed, async-actor) and
//! [`crate::fix::vec_store`] predate this trait; [`crate::fix::file_store`] is the new backend
//! added to cover spec.md's "hard case".

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("an I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),
    #[error("attempted to set sequence number to {attempted}, which regresses past the current value {current}")]
    SequenceRegression { current: u32, attempted: u32 },
    #[error("message record at seq {0} was missing or corrupt")]
    CorruptRecord(u32),
}

/// Synchronous message-store contract. `Store` (the sqlite-backed actor in `store.rs`) predates
/// this trait and exposes an async, channel-based API instead of implementing it directly; see
/// DESIGN.md for why the two coexist.
pub trait MessageStore {
    /// Persists one outbound message at `seq`. Returns `false` if a message already occupies
    /// that sequence number and was not overwritten (the reference treats this as non-fatal).
    fn set(&mut self, seq: u32, bytes: &[u8]) -> Result<bool, StoreError>;

    /// Retrieves a contiguous range `[low, high]`, inclusive. Sequence numbers with no stored
    /// message (because they were administrative and never persisted) are simply absent from
    /// the result, not errors.
    fn get(&self, low: u32, high: u32) -> Result<Vec<(u32, Vec<u8>)>, StoreError>;

    fn next_sender_seq(&self) -> u32;
    fn next_target_seq(&self) -> u32;
    fn set_next_sender_seq(&mut self, seq: u32) -> Result<(), StoreError>;
    fn set_next_target_seq(&mut self, seq: u32) -> Result<(), StoreError>;

    fn incr_next_sender_seq(&mut self) -> Result<(), StoreError> {
        let next = self.next_sender_seq() + 1;
        self.set_next_sender_seq(next)
    }
    fn incr_next_target_seq(&mut self) -> Result<(), StoreError> {
        let next = self.next_target_seq() + 1;
        self.set_next_target_seq(next)
    }

    fn creation_time(&self) -> DateTime<Utc>;

    /// Zeroes the log, resets both sequence counters to 1, and sets `creation_time` to now.
    fn reset(&mut self) -> Result<(), StoreError>;

    /// Re-reads state from underlying storage, for multi-process access or recovery after a
    /// crash left in-memory state stale. Backends with no external state (pure in-memory) treat
    /// this as a no-op.
    fn refresh(&mut self) -> Result<(), StoreError>;
}
