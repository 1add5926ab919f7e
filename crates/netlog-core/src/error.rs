//! # error
//!
//! why: report stored payloads that cannot be turned back into entries
//! relations: returned by codec::deserialize, surfaced as scan warnings by netlog-storage
//! what: DecodeError

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty entry payload")]
    Empty,
    #[error("malformed entry payload: {0}")]
    Json(#[from] serde_json::Error),
}
