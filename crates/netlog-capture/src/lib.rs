//! # netlog-capture
//!
//! why: record outbound traffic in-process, with no proxy, for later diagnosis
//! relations: encodes with netlog-core, persists through netlog-storage
//! what: interception layer, staging buffer, background flusher, capture session
//!
//! ```ignore
//! let session = CaptureSession::start_or_disabled(&host_config);
//! let client = Interceptor::new(transport, session.as_ref().map(|s| s.handle()));
//! let response = client.execute(Request::new("GET", "https://api.example.com/"))?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod flusher;
pub mod intercept;
pub mod session;

pub use buffer::{PushOutcome, StagingBuffer};
pub use config::{CaptureConfig, ConfigSource};
pub use error::InitError;
pub use flusher::FlushStats;
pub use intercept::{Interceptor, Request, Response, Transport};
pub use session::{CaptureHandle, CaptureSession};
