//! # scan
//!
//! why: enumerate stored entries lazily while another process may be appending
//! relations: built by file.rs (writer recovery) and reader.rs (viewer side)
//! what: Scan iterator bounded by the file length observed when it starts

use crate::frame::{Corruption, CorruptionKind, FrameEvent, FrameIter, FRAME_OVERHEAD};
use netlog_core::{deserialize, LogEntry};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lazy, ordered sequence of entries in `[from, boundary)`.
///
/// Damaged regions are skipped, logged, and kept in [`Scan::corruptions`];
/// they never end the scan early.
pub struct Scan {
    frames: Option<FrameIter<File>>,
    path: PathBuf,
    corruptions: Vec<Corruption>,
}

impl Scan {
    /// start at `from`, fixing the boundary to the file's current length
    pub(crate) fn open(path: &Path, from: u64) -> io::Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::empty(path)),
            Err(err) => return Err(err),
        };
        let boundary = file.metadata()?.len();
        Self::bounded(file, path, from, boundary)
    }

    pub(crate) fn bounded(file: File, path: &Path, from: u64, boundary: u64) -> io::Result<Self> {
        Ok(Self {
            frames: Some(FrameIter::new(file, from, boundary)?),
            path: path.to_path_buf(),
            corruptions: Vec::new(),
        })
    }

    fn empty(path: &Path) -> Self {
        Self {
            frames: None,
            path: path.to_path_buf(),
            corruptions: Vec::new(),
        }
    }

    /// regions skipped so far
    pub fn corruptions(&self) -> &[Corruption] {
        &self.corruptions
    }

    /// file length captured when the scan began
    pub fn boundary(&self) -> u64 {
        self.frames.as_ref().map_or(0, |f| f.boundary())
    }

    /// offset just past the last frame visited; a later scan can resume here
    /// as long as the store was not compacted in between
    pub fn position(&self) -> u64 {
        self.frames.as_ref().map_or(0, |f| f.position())
    }

    pub(crate) fn last_frame_end(&self) -> u64 {
        self.frames.as_ref().map_or(0, |f| f.last_frame_end())
    }

    fn record(&mut self, corruption: Corruption) {
        warn!(
            path = %self.path.display(),
            offset = corruption.offset,
            skipped = corruption.skipped,
            reason = %corruption.kind,
            "skipping damaged region of capture store"
        );
        self.corruptions.push(corruption);
    }
}

impl Iterator for Scan {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let event = self.frames.as_mut()?.next()?;
            match event {
                FrameEvent::Frame { offset, payload } => match deserialize(&payload) {
                    Ok(entry) => return Some(entry),
                    Err(err) => self.record(Corruption {
                        offset,
                        skipped: payload.len() as u64 + FRAME_OVERHEAD,
                        kind: CorruptionKind::Decode(err.to_string()),
                    }),
                },
                FrameEvent::Corrupt(corruption) => self.record(corruption),
            }
        }
    }
}
