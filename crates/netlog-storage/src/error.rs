//! # error
//!
//! why: separate writer-side failures from reader-side lookups
//! relations: returned by file.rs / memory.rs (StoreError) and reader.rs (ReadError)
//! what: StoreError, ReadError

use std::io;
use thiserror::Error;

/// Failure of a write-side operation. The affected batch is lost; the
/// store stays usable for the next one.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("entry id {got} does not follow last stored id {last}")]
    OutOfOrder { last: u64, got: u64 },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("store read failed: {0}")]
    Io(#[from] io::Error),
    #[error("no entry with id {0}")]
    NotFound(u64),
}
