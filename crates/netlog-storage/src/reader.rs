//! # reader
//!
//! why: let a separate diagnostic process inspect the capture log safely
//! relations: reads files written by file.rs; never opens them for writing
//! what: StoreReader, list_entries, get_entry

use crate::error::ReadError;
use crate::scan::Scan;
use netlog_core::LogEntry;
use std::path::{Path, PathBuf};

/// Read-only view of a capture store.
///
/// Holds no file handle between calls: every scan reopens the file, so a
/// compaction in the writing process is picked up on the next scan.
#[derive(Debug, Clone)]
pub struct StoreReader {
    path: PathBuf,
}

impl StoreReader {
    /// no file is created; a store that does not exist yet reads as empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// entries from byte offset `from` up to the store's current length
    pub fn scan(&self, from: u64) -> Result<Scan, ReadError> {
        Ok(Scan::open(&self.path, from)?)
    }

    pub fn list(&self) -> Result<Vec<LogEntry>, ReadError> {
        Ok(self.scan(0)?.collect())
    }

    /// ids are strictly increasing, so the scan stops at the first larger id
    pub fn get(&self, id: u64) -> Result<LogEntry, ReadError> {
        self.scan(0)?
            .take_while(|entry| entry.id <= id)
            .find(|entry| entry.id == id)
            .ok_or(ReadError::NotFound(id))
    }

    /// entries newer than `after`, for viewers polling for updates
    pub fn entries_after(&self, after: u64) -> Result<Vec<LogEntry>, ReadError> {
        Ok(self.scan(0)?.skip_while(|entry| entry.id <= after).collect())
    }
}

pub fn list_entries(store_path: impl AsRef<Path>) -> Result<Vec<LogEntry>, ReadError> {
    StoreReader::open(store_path.as_ref()).list()
}

pub fn get_entry(store_path: impl AsRef<Path>, id: u64) -> Result<LogEntry, ReadError> {
    StoreReader::open(store_path.as_ref()).get(id)
}
