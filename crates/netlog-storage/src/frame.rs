//! # frame
//!
//! why: make every stored entry self-delimiting and self-checking
//! relations: written by file.rs, walked by scan.rs and compaction
//! what: frame encoding, FrameIter with bounded reads and forward resync
//!
//! layout of one frame:
//! ```text
//! [length: u32 LE][payload: length bytes][crc32: u32 LE]
//! ```
//! the crc covers the four length bytes and the payload.

use std::io::{self, BufReader, Read, Seek, SeekFrom};

/// bytes a frame adds around its payload
pub const FRAME_OVERHEAD: u64 = 8;

/// upper bound on a plausible payload; anything larger is treated as garbage
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A region of the store that could not be turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corruption {
    /// byte offset where the bad region starts
    pub offset: u64,
    /// bytes skipped before the next usable frame (or the scan boundary)
    pub skipped: u64,
    pub kind: CorruptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorruptionKind {
    ImplausibleLength(u32),
    ChecksumMismatch,
    /// length runs past the scan boundary but a later valid frame exists
    Overrun,
    /// frame checksums fine but the payload is not a valid entry
    Decode(String),
    Io(String),
}

impl std::fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptionKind::ImplausibleLength(len) => write!(f, "implausible frame length {len}"),
            CorruptionKind::ChecksumMismatch => write!(f, "checksum mismatch"),
            CorruptionKind::Overrun => write!(f, "frame overruns its neighbours"),
            CorruptionKind::Decode(err) => write!(f, "undecodable payload: {err}"),
            CorruptionKind::Io(err) => write!(f, "read failed: {err}"),
        }
    }
}

fn checksum(len_bytes: &[u8; 4], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(len_bytes);
    hasher.update(payload);
    hasher.finalize()
}

/// Build a complete frame so it can go out in one write call.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len_bytes = (payload.len() as u32).to_le_bytes();
    let crc = checksum(&len_bytes, payload);

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD as usize);
    frame.extend_from_slice(&len_bytes);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

pub(crate) enum FrameEvent {
    Frame { offset: u64, payload: Vec<u8> },
    Corrupt(Corruption),
}

enum Probe {
    Frame(Vec<u8>),
    Bad(CorruptionKind),
    /// not enough bytes before the boundary to hold this frame
    Beyond,
}

/// Walks frames in `[from, boundary)`. Never reads at or past `boundary`.
pub(crate) struct FrameIter<R> {
    reader: BufReader<R>,
    /// current position of `reader`
    at: u64,
    /// start of the next frame to visit
    pos: u64,
    boundary: u64,
    last_frame_end: u64,
    done: bool,
}

impl<R: Read + Seek> FrameIter<R> {
    pub(crate) fn new(mut inner: R, from: u64, boundary: u64) -> io::Result<Self> {
        let from = from.min(boundary);
        inner.seek(SeekFrom::Start(from))?;
        Ok(Self {
            reader: BufReader::new(inner),
            at: from,
            pos: from,
            boundary,
            last_frame_end: from,
            done: false,
        })
    }

    pub(crate) fn boundary(&self) -> u64 {
        self.boundary
    }

    /// where the next scan should start to continue after this one
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    /// end of the last checksum-valid frame seen
    pub(crate) fn last_frame_end(&self) -> u64 {
        self.last_frame_end
    }

    fn goto(&mut self, pos: u64) -> io::Result<()> {
        if pos != self.at {
            // seek_relative keeps the buffer when the target is inside it
            self.reader.seek_relative(pos as i64 - self.at as i64)?;
            self.at = pos;
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.reader.read_exact(buf)?;
        self.at += buf.len() as u64;
        Ok(())
    }

    fn probe(&mut self, pos: u64) -> io::Result<Probe> {
        if pos + FRAME_OVERHEAD > self.boundary {
            return Ok(Probe::Beyond);
        }
        self.goto(pos)?;

        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes);
        if len == 0 || len > MAX_FRAME_LEN {
            return Ok(Probe::Bad(CorruptionKind::ImplausibleLength(len)));
        }
        if pos + FRAME_OVERHEAD + len as u64 > self.boundary {
            return Ok(Probe::Beyond);
        }

        let mut payload = vec![0u8; len as usize];
        self.read_exact(&mut payload)?;
        let mut crc_bytes = [0u8; 4];
        self.read_exact(&mut crc_bytes)?;

        if u32::from_le_bytes(crc_bytes) != checksum(&len_bytes, &payload) {
            return Ok(Probe::Bad(CorruptionKind::ChecksumMismatch));
        }
        Ok(Probe::Frame(payload))
    }

    /// first offset at or after `start` holding a valid frame
    fn resync(&mut self, start: u64) -> io::Result<Option<u64>> {
        let mut candidate = start;
        while candidate + FRAME_OVERHEAD <= self.boundary {
            if let Probe::Frame(_) = self.probe(candidate)? {
                return Ok(Some(candidate));
            }
            candidate += 1;
        }
        Ok(None)
    }

    fn step(&mut self) -> io::Result<Option<FrameEvent>> {
        let start = self.pos;
        let kind = match self.probe(start)? {
            Probe::Frame(payload) => {
                self.pos = start + FRAME_OVERHEAD + payload.len() as u64;
                self.last_frame_end = self.pos;
                return Ok(Some(FrameEvent::Frame { offset: start, payload }));
            }
            Probe::Bad(kind) => Some(kind),
            Probe::Beyond => None,
        };

        match self.resync(start + 1)? {
            Some(next) => {
                self.pos = next;
                Ok(Some(FrameEvent::Corrupt(Corruption {
                    offset: start,
                    skipped: next - start,
                    kind: kind.unwrap_or(CorruptionKind::Overrun),
                })))
            }
            None => {
                self.done = true;
                // an incomplete frame at the very end is an append still in
                // flight or a torn write; neither is reported
                Ok(kind.map(|kind| {
                    FrameEvent::Corrupt(Corruption {
                        offset: start,
                        skipped: self.boundary - start,
                        kind,
                    })
                }))
            }
        }
    }
}

impl<R: Read + Seek> Iterator for FrameIter<R> {
    type Item = FrameEvent;

    fn next(&mut self) -> Option<FrameEvent> {
        if self.done || self.pos >= self.boundary {
            return None;
        }
        match self.step() {
            Ok(event) => event,
            Err(err) => {
                self.done = true;
                Some(FrameEvent::Corrupt(Corruption {
                    offset: self.pos,
                    skipped: self.boundary.saturating_sub(self.pos),
                    kind: CorruptionKind::Io(err.to_string()),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames(bytes: Vec<u8>) -> Vec<FrameEvent> {
        let len = bytes.len() as u64;
        FrameIter::new(Cursor::new(bytes), 0, len).unwrap().collect()
    }

    fn payloads(events: &[FrameEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::Frame { payload, .. } => Some(payload.clone()),
                FrameEvent::Corrupt(_) => None,
            })
            .collect()
    }

    #[test]
    fn frame_layout_is_length_payload_crc() {
        let frame = encode_frame(b"abc");
        assert_eq!(frame.len(), 3 + FRAME_OVERHEAD as usize);
        assert_eq!(&frame[..4], &3u32.to_le_bytes());
        assert_eq!(&frame[4..7], b"abc");
    }

    #[test]
    fn reads_consecutive_frames() {
        let mut bytes = encode_frame(b"one");
        bytes.extend(encode_frame(b"two"));
        let events = frames(bytes);
        assert_eq!(payloads(&events), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn flipped_byte_is_skipped_and_resynced() {
        let mut bytes = encode_frame(b"first");
        let second_at = bytes.len();
        bytes.extend(encode_frame(b"second"));
        bytes.extend(encode_frame(b"third"));
        bytes[second_at + 5] ^= 0xFF;

        let events = frames(bytes);
        assert_eq!(payloads(&events), vec![b"first".to_vec(), b"third".to_vec()]);
        let corrupt: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FrameEvent::Corrupt(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(corrupt.len(), 1);
        assert_eq!(corrupt[0].offset, second_at as u64);
        assert_eq!(corrupt[0].kind, CorruptionKind::ChecksumMismatch);
    }

    #[test]
    fn torn_tail_is_silent() {
        let mut bytes = encode_frame(b"whole");
        let torn = encode_frame(b"partial");
        bytes.extend_from_slice(&torn[..torn.len() - 3]);

        let mut iter = FrameIter::new(Cursor::new(bytes.clone()), 0, bytes.len() as u64).unwrap();
        let events: Vec<_> = iter.by_ref().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(payloads(&events), vec![b"whole".to_vec()]);
        assert_eq!(iter.last_frame_end(), encode_frame(b"whole").len() as u64);
    }

    #[test]
    fn boundary_hides_bytes_past_it() {
        let mut bytes = encode_frame(b"visible");
        let boundary = bytes.len() as u64;
        bytes.extend(encode_frame(b"later"));

        let events: Vec<_> = FrameIter::new(Cursor::new(bytes), 0, boundary).unwrap().collect();
        assert_eq!(payloads(&events), vec![b"visible".to_vec()]);
    }

    #[test]
    fn zero_length_is_implausible() {
        let mut bytes = vec![0u8; 8];
        bytes.extend(encode_frame(b"after"));
        let events = frames(bytes);
        assert!(matches!(
            &events[0],
            FrameEvent::Corrupt(Corruption { offset: 0, kind: CorruptionKind::ImplausibleLength(0), .. })
        ));
        assert_eq!(payloads(&events), vec![b"after".to_vec()]);
    }
}
