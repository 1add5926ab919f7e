//! # memory
//!
//! why: exercise the capture pipeline without touching the filesystem
//! relations: implements the Storage trait alongside FileStore
//! what: InMemoryStore, a shareable store that can be told to fail

use crate::error::StoreError;
use crate::frame::FRAME_OVERHEAD;
use crate::{check_order, encode_batch, Appended, CompactStats, Storage};
use netlog_core::LogEntry;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// in-memory storage for testing
///
/// clones share state, so a test can hand one clone to the capture
/// session and inspect the other
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    /// entry plus the size its frame would take on disk
    frames: Vec<(LogEntry, u64)>,
    len: u64,
    last_id: Option<u64>,
    failing: bool,
    appends: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// make every following append fail with an i/o error
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().frames.iter().map(|(e, _)| e.clone()).collect()
    }

    /// number of successful non-empty appends
    pub fn append_calls(&self) -> usize {
        self.state.lock().appends
    }
}

impl Storage for InMemoryStore {
    fn append(&mut self, entries: &[LogEntry]) -> Result<Appended, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let start = state.len;
        if entries.is_empty() {
            return Ok(Appended::empty(start));
        }
        if state.failing {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated write failure").into());
        }
        check_order(state.last_id, entries)?;

        let (payloads, skipped) = encode_batch(entries);
        for (entry, payload) in payloads {
            let size = payload.len() as u64 + FRAME_OVERHEAD;
            state.len += size;
            state.last_id = Some(entry.id);
            state.frames.push((entry.clone(), size));
        }
        state.appends += 1;
        Ok(Appended { range: start..state.len, skipped })
    }

    fn compact(&mut self, max_size_bytes: u64) -> Result<CompactStats, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let bytes_before = state.len;
        if bytes_before <= max_size_bytes {
            return Ok(CompactStats::unchanged(bytes_before));
        }

        let mut dropped = 0;
        while state.len > max_size_bytes && dropped < state.frames.len() {
            let size = state.frames[dropped].1;
            state.len -= size;
            dropped += 1;
        }
        state.frames.drain(..dropped);

        Ok(CompactStats {
            frames_kept: state.frames.len(),
            frames_dropped: dropped,
            bytes_before,
            bytes_after: state.len,
        })
    }

    fn load_all(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.entries())
    }

    fn size(&self) -> u64 {
        self.state.lock().len
    }

    fn last_id(&self) -> Option<u64> {
        self.state.lock().last_id
    }
}
