//! # error
//!
//! why: explain why capture could not start; the host then runs without it
//! relations: returned by CaptureSession::start (session.rs)
//! what: InitError

use netlog_storage::StoreError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("network capture is disabled")]
    Disabled,
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),
    #[error("capture store unusable: {0}")]
    Storage(#[from] StoreError),
    #[error("could not start capture flusher: {0}")]
    Spawn(#[source] io::Error),
}
