//! # codec
//!
//! why: turn raw captures into bounded entries and entries into stored bytes
//! relations: called by netlog-capture on completion, by netlog-storage per frame
//! what: CodecLimits, encode, serialize, deserialize

use crate::entry::{Body, EntryDraft, LogEntry, Outcome, RawCapture, Status};
use crate::error::DecodeError;
use crate::headers::Headers;
use serde::{Deserialize, Serialize};
use std::time::UNIX_EPOCH;

/// Appended to header values cut down to `max_header_value_bytes`.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Synthetic header recording how many headers past `max_headers` were dropped.
pub const DROPPED_HEADERS: &str = "x-netlog-dropped-headers";

/// Size caps applied while encoding. Enforced here so nothing upstream
/// ever has to wait on an oversized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecLimits {
    pub max_body_bytes: usize,
    pub max_header_value_bytes: usize,
    pub max_headers: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            max_header_value_bytes: 8 * 1024,
            max_headers: 128,
        }
    }
}

/// Normalize a raw capture into a draft entry, applying `limits`.
pub fn encode(raw: RawCapture, limits: &CodecLimits) -> EntryDraft {
    let (status, response_headers, response_body) = match raw.outcome {
        Outcome::Response { code, headers, body } => (
            Status::Success { code },
            cap_headers(headers, limits),
            body.map(|b| cap_body(b, limits)),
        ),
        Outcome::Failure { error } => (Status::Failure { error }, Headers::new(), None),
        Outcome::Cancelled => (Status::Cancelled, Headers::new(), None),
    };

    EntryDraft {
        url: raw.url,
        method: raw.method,
        request_headers: cap_headers(raw.request_headers, limits),
        response_headers,
        request_body: raw.request_body.map(|b| cap_body(b, limits)),
        response_body,
        status,
        started_at: raw.started_at.max(UNIX_EPOCH),
        duration: raw.duration,
        process_tag: raw.process_tag,
    }
}

/// Entry payload bytes. Framing is the store's job.
///
/// Fails only for entries built by hand with a `started_at` before the
/// unix epoch; [`encode`] never produces those.
pub fn serialize(entry: &LogEntry) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(entry)
}

pub fn deserialize(bytes: &[u8]) -> Result<LogEntry, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn cap_body(mut body: Body, limits: &CodecLimits) -> Body {
    body.original_len = body.original_len.max(body.data.len() as u64);
    body.data.truncate(limits.max_body_bytes);
    body
}

fn cap_headers(headers: Headers, limits: &CodecLimits) -> Headers {
    let total = headers.len();
    let mut capped: Headers = headers
        .into_iter()
        .take(limits.max_headers)
        .map(|(name, value)| {
            let value = cap_value(value, limits.max_header_value_bytes);
            (name, value)
        })
        .collect();

    if total > limits.max_headers {
        capped.push(DROPPED_HEADERS, (total - limits.max_headers).to_string());
    }
    capped
}

fn cap_value(mut value: String, max: usize) -> String {
    if value.len() <= max {
        return value;
    }
    let mut cut = max;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
    value.push_str(TRUNCATION_MARKER);
    value
}
