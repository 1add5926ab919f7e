//! # entry
//!
//! why: one normalized, immutable record per observed request attempt
//! relations: built by codec.rs, framed by netlog-storage, produced by netlog-capture
//! what: LogEntry, Status, Body, RawCapture input, EntryDraft staging form

use crate::headers::Headers;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// How a captured attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The transport produced a response, whatever its status code.
    Success { code: u16 },
    /// The transport failed before producing a response.
    Failure { error: String },
    /// The attempt was abandoned before completion.
    Cancelled,
}

impl Status {
    pub fn code(&self) -> Option<u16> {
        match self {
            Status::Success { code } => Some(*code),
            _ => None,
        }
    }
}

/// A body payload, possibly cut down to the configured cap.
///
/// `original_len` always holds the size the transport saw, so a body with
/// `original_len > data.len()` carries its own truncation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub original_len: u64,
}

impl Body {
    pub fn is_truncated(&self) -> bool {
        self.original_len > self.data.len() as u64
    }

    /// copy at most `max` leading bytes of `data`, remembering its full size
    pub fn capped(data: &[u8], max: usize) -> Self {
        Self {
            data: data[..data.len().min(max)].to_vec(),
            original_len: data.len() as u64,
        }
    }

    /// lossy utf-8 view, handy for assertions and viewers
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        let original_len = data.len() as u64;
        Self { data, original_len }
    }
}

/// A captured request attempt as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing within a store; the store's ordering key.
    pub id: u64,
    pub url: String,
    pub method: String,
    pub request_headers: Headers,
    pub response_headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Body>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Body>,
    pub status: Status,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// Which capturing process/session produced the entry.
    pub process_tag: String,
}

/// What the transport did with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Response {
        code: u16,
        headers: Headers,
        body: Option<Body>,
    },
    Failure {
        error: String,
    },
    Cancelled,
}

/// Everything the interception layer knows about one attempt, before
/// limits are applied.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub method: String,
    pub url: String,
    pub request_headers: Headers,
    pub request_body: Option<Body>,
    pub outcome: Outcome,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub process_tag: String,
}

/// A fully encoded entry still waiting for its id.
///
/// All copying and truncation happens while producing the draft; sealing is
/// a move, so ids can be handed out inside a short critical section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub(crate) url: String,
    pub(crate) method: String,
    pub(crate) request_headers: Headers,
    pub(crate) response_headers: Headers,
    pub(crate) request_body: Option<Body>,
    pub(crate) response_body: Option<Body>,
    pub(crate) status: Status,
    pub(crate) started_at: SystemTime,
    pub(crate) duration: Duration,
    pub(crate) process_tag: String,
}

impl EntryDraft {
    pub fn seal(self, id: u64) -> LogEntry {
        LogEntry {
            id,
            url: self.url,
            method: self.method,
            request_headers: self.request_headers,
            response_headers: self.response_headers,
            request_body: self.request_body,
            response_body: self.response_body,
            status: self.status,
            started_at: self.started_at,
            duration: self.duration,
            process_tag: self.process_tag,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::decode(text).map_err(serde::de::Error::custom)
    }
}
