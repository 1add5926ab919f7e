//! # file
//!
//! why: the single-writer side of the on-disk capture log
//! relations: driven by netlog-capture's flusher, read concurrently via reader.rs
//! what: FileStore with recovery on open, whole-frame appends, rename-swap compaction

use crate::error::StoreError;
use crate::frame::{encode_frame, FrameEvent, FrameIter, FRAME_OVERHEAD};
use crate::scan::Scan;
use crate::{check_order, encode_batch, Appended, CompactStats, Storage};
use netlog_core::LogEntry;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Append-only capture log backed by one file.
///
/// Every frame goes out in a single write at end of file and each batch is
/// synced before `append` returns, so a reader that bounds its scan by the
/// file length it observed only ever sees whole frames.
pub struct FileStore {
    path: PathBuf,
    file: File,
    len: u64,
    last_id: Option<u64>,
    /// `file` may still point at a store replaced by compaction
    stale: bool,
}

/// High-water mark kept next to the store so ids never restart after a
/// compaction drops every frame.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreMeta {
    last_id: Option<u64>,
}

impl FileStore {
    /// open or create the store at `path`, creating missing directories
    ///
    /// an incomplete frame left at the end by an earlier crash is trimmed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = open_for_append(&path)?;
        let boundary = file.metadata()?.len();

        let mut scan = Scan::bounded(File::open(&path)?, &path, 0, boundary)?;
        let mut entries = 0usize;
        let mut last_id = None;
        for entry in scan.by_ref() {
            entries += 1;
            last_id = last_id.max(Some(entry.id));
        }
        last_id = last_id.max(load_meta(&path).last_id);

        let valid_end = scan.last_frame_end();
        let len = if valid_end < boundary {
            warn!(
                path = %path.display(),
                valid_end,
                boundary,
                "trimming incomplete tail of capture store"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
            valid_end
        } else {
            boundary
        };

        info!(
            path = %path.display(),
            entries,
            bytes = len,
            corrupt_regions = scan.corruptions().len(),
            "opened capture store"
        );

        Ok(Self {
            path,
            file,
            len,
            last_id,
            stale: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// entries starting at byte offset `from`, up to the current end of file
    pub fn scan(&self, from: u64) -> Result<Scan, StoreError> {
        Ok(Scan::bounded(File::open(&self.path)?, &self.path, from, self.len)?)
    }

    /// point the append handle back at whatever file is at `path` now
    fn reopen(&mut self) -> io::Result<()> {
        self.stale = true;
        self.file = open_for_append(&self.path)?;
        self.len = self.file.metadata()?.len();
        self.stale = false;
        Ok(())
    }

    fn rollback(&mut self, to: u64) {
        if let Err(err) = self.file.set_len(to) {
            warn!(path = %self.path.display(), error = %err, "failed to roll back partial batch");
        }
        self.len = self.file.metadata().map(|m| m.len()).unwrap_or(to);
    }

    fn write_batch(&mut self, payloads: &[(&LogEntry, Vec<u8>)]) -> io::Result<()> {
        for (_, payload) in payloads {
            self.file.write_all(&encode_frame(payload))?;
        }
        self.file.sync_data()
    }

    fn save_meta(&self) -> io::Result<()> {
        let meta = StoreMeta { last_id: self.last_id };
        let json = serde_json::to_vec(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = sibling(&self.path, ".meta.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, sibling(&self.path, ".meta"))
    }

    fn write_compacted(&self, tmp: &Path, spans: &[(u64, u64)]) -> io::Result<()> {
        let mut src = File::open(&self.path)?;
        let mut out = BufWriter::new(File::create(tmp)?);
        for &(offset, len) in spans {
            src.seek(SeekFrom::Start(offset))?;
            let copied = io::copy(&mut (&mut src).take(len), &mut out)?;
            if copied != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "store shrank during compaction",
                ));
            }
        }
        let out = out.into_inner().map_err(|err| err.into_error())?;
        out.sync_all()
    }
}

impl Storage for FileStore {
    fn append(&mut self, entries: &[LogEntry]) -> Result<Appended, StoreError> {
        if self.stale {
            self.reopen()?;
        }
        let start = self.len;
        if entries.is_empty() {
            return Ok(Appended::empty(start));
        }
        check_order(self.last_id, entries)?;

        let (payloads, skipped) = encode_batch(entries);
        let Some(&(last, _)) = payloads.last() else {
            return Ok(Appended { range: start..start, skipped });
        };

        match self.write_batch(&payloads) {
            Ok(()) => {
                self.len = self.file.metadata()?.len();
                self.last_id = Some(last.id);
                debug!(entries = payloads.len(), start, end = self.len, "appended batch");
                Ok(Appended { range: start..self.len, skipped })
            }
            Err(err) => {
                self.rollback(start);
                Err(err.into())
            }
        }
    }

    fn compact(&mut self, max_size_bytes: u64) -> Result<CompactStats, StoreError> {
        let bytes_before = self.len;
        if bytes_before <= max_size_bytes {
            return Ok(CompactStats::unchanged(bytes_before));
        }

        let mut spans = Vec::new();
        for event in FrameIter::new(File::open(&self.path)?, 0, self.len)? {
            if let FrameEvent::Frame { offset, payload } = event {
                spans.push((offset, payload.len() as u64 + FRAME_OVERHEAD));
            }
        }

        // newest frames first, until the next one would not fit
        let mut bytes_after = 0;
        let mut first_kept = spans.len();
        for (index, &(_, len)) in spans.iter().enumerate().rev() {
            if bytes_after + len > max_size_bytes {
                break;
            }
            bytes_after += len;
            first_kept = index;
        }

        // the high-water id must be on disk before frames carrying it go away
        self.save_meta()?;

        let tmp = sibling(&self.path, ".compact");
        let written = self
            .write_compacted(&tmp, &spans[first_kept..])
            .and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        // from here on the old handle points at an unlinked file
        self.len = bytes_after;
        self.reopen()?;
        if let Err(err) = sync_parent(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to sync store directory");
        }

        let stats = CompactStats {
            frames_kept: spans.len() - first_kept,
            frames_dropped: first_kept,
            bytes_before,
            bytes_after,
        };
        info!(
            path = %self.path.display(),
            kept = stats.frames_kept,
            dropped = stats.frames_dropped,
            bytes_before,
            bytes_after,
            "compacted capture store"
        );
        Ok(stats)
    }

    fn load_all(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.scan(0)?.collect())
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn last_id(&self) -> Option<u64> {
        self.last_id
    }
}

fn open_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn load_meta(path: &Path) -> StoreMeta {
    let meta_path = sibling(path, ".meta");
    let bytes = match fs::read(&meta_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return StoreMeta::default(),
        Err(err) => {
            warn!(path = %meta_path.display(), error = %err, "could not read store metadata");
            return StoreMeta::default();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        warn!(path = %meta_path.display(), error = %err, "ignoring malformed store metadata");
        StoreMeta::default()
    })
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
