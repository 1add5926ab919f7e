//! # netlog-storage
//!
//! why: persist captured entries so another process can read them after the fact
//! relations: used by netlog-capture's flusher; reader side used by viewers
//! what: Storage trait, FileStore, InMemoryStore, framing, lazy scans, read-only access

pub mod error;
pub mod file;
pub mod frame;
pub mod memory;
pub mod reader;
pub mod scan;

pub use error::{ReadError, StoreError};
pub use file::FileStore;
pub use frame::{Corruption, CorruptionKind};
pub use memory::InMemoryStore;
pub use reader::{get_entry, list_entries, StoreReader};
pub use scan::Scan;

use netlog_core::{serialize, LogEntry};
use std::ops::Range;
use tracing::warn;

/// trait for the durable side of the capture pipeline
///
/// implementations have exactly one writer; readers go through
/// [`StoreReader`] and never share a handle with the writer
pub trait Storage: Send {
    /// append entries as consecutive frames
    fn append(&mut self, entries: &[LogEntry]) -> Result<Appended, StoreError>;

    /// drop the oldest whole frames until the store fits in `max_size_bytes`
    fn compact(&mut self, max_size_bytes: u64) -> Result<CompactStats, StoreError>;

    /// every readable entry in store order
    fn load_all(&self) -> Result<Vec<LogEntry>, StoreError>;

    /// current size in bytes
    fn size(&self) -> u64;

    /// highest id ever appended, surviving compaction
    fn last_id(&self) -> Option<u64>;
}

/// What an append wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// byte range the batch occupies
    pub range: Range<u64>,
    /// ids left out because their payload could not be serialized
    pub skipped: Vec<u64>,
}

impl Appended {
    pub(crate) fn empty(at: u64) -> Self {
        Self { range: at..at, skipped: Vec::new() }
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactStats {
    pub frames_kept: usize,
    pub frames_dropped: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl CompactStats {
    fn unchanged(bytes: u64) -> Self {
        Self {
            bytes_before: bytes,
            bytes_after: bytes,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.frames_dropped == 0 && self.bytes_before == self.bytes_after
    }
}

pub(crate) fn check_order(mut last: Option<u64>, entries: &[LogEntry]) -> Result<(), StoreError> {
    for entry in entries {
        if let Some(prev) = last {
            if entry.id <= prev {
                return Err(StoreError::OutOfOrder { last: prev, got: entry.id });
            }
        }
        last = Some(entry.id);
    }
    Ok(())
}

/// Serialize a batch ahead of writing it. Entries that fail are logged and
/// reported by id; the rest keep their order.
pub(crate) fn encode_batch(entries: &[LogEntry]) -> (Vec<(&LogEntry, Vec<u8>)>, Vec<u64>) {
    let mut payloads = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for entry in entries {
        match serialize(entry) {
            Ok(payload) => payloads.push((entry, payload)),
            Err(err) => {
                warn!(id = entry.id, error = %err, "entry could not be serialized, skipping");
                skipped.push(entry.id);
            }
        }
    }
    (payloads, skipped)
}
