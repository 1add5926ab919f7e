//! # netlog-core
//!
//! why: describe captured network traffic as normalized, write-once log entries
//! relations: used by netlog-storage for framing, netlog-capture for entry production
//! what: LogEntry model, ordered headers, size-capped bodies, the entry codec

pub mod codec;
pub mod entry;
pub mod error;
pub mod headers;

pub use codec::{deserialize, encode, serialize, CodecLimits, TRUNCATION_MARKER};
pub use entry::{Body, EntryDraft, LogEntry, Outcome, RawCapture, Status};
pub use error::DecodeError;
pub use headers::Headers;
