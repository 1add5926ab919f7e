//! # session
//!
//! why: own the capture pipeline for as long as the host keeps capture on
//! relations: builds buffer.rs + flusher.rs over a netlog-storage store; hands CaptureHandle to intercept.rs
//! what: CaptureSession lifecycle, CaptureHandle entry sink

use crate::buffer::{PushOutcome, StagingBuffer};
use crate::config::{CaptureConfig, ConfigSource};
use crate::error::InitError;
use crate::flusher::{FlushCounters, FlushPolicy, FlushStats, Flusher};
use crate::intercept::Request;
use netlog_core::{encode, Body, CodecLimits, Outcome, RawCapture};
use netlog_storage::{FileStore, Storage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

struct Shared {
    buffer: Arc<StagingBuffer>,
    enabled: AtomicBool,
    limits: CodecLimits,
    process_tag: String,
}

/// Cheap, cloneable sink the interception layer records into.
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<Shared>,
}

impl CaptureHandle {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    pub fn process_tag(&self) -> &str {
        &self.shared.process_tag
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.shared.limits
    }

    /// encode one finished attempt and stage it
    pub fn record(
        &self,
        request: Request,
        outcome: Outcome,
        started_at: SystemTime,
        duration: Duration,
    ) -> PushOutcome {
        let raw = RawCapture {
            method: request.method,
            url: request.url,
            request_headers: request.headers,
            request_body: request.body.map(Body::from),
            outcome,
            started_at,
            duration,
            process_tag: self.shared.process_tag.clone(),
        };
        let outcome = self.shared.buffer.push(encode(raw, &self.shared.limits));
        if outcome == PushOutcome::Rejected {
            trace!("capture session stopped, entry discarded");
        }
        outcome
    }
}

/// The enabled capture feature: staging buffer, flusher thread and store.
///
/// Dropping the session stops it.
pub struct CaptureSession {
    handle: CaptureHandle,
    flusher: Flusher,
    counters: Arc<FlushCounters>,
    store_path: Option<PathBuf>,
    stopped: bool,
}

impl CaptureSession {
    /// open the store at `config.store_path()` and start capturing
    pub fn start(config: &CaptureConfig) -> Result<Self, InitError> {
        if !config.enabled {
            return Err(InitError::Disabled);
        }
        config.validate()?;

        let path = config.store_path();
        let store = FileStore::open(&path)?;
        Self::launch(config, Box::new(store), Some(path))
    }

    /// start over a caller-supplied store; `config.enabled` is not consulted
    pub fn with_storage(config: &CaptureConfig, store: Box<dyn Storage>) -> Result<Self, InitError> {
        config.validate()?;
        Self::launch(config, store, None)
    }

    /// Start if the host's configuration asks for it. Any failure leaves
    /// capture off and is only logged.
    pub fn start_or_disabled(source: &dyn ConfigSource) -> Option<Self> {
        let config = source.capture_config();
        match Self::start(&config) {
            Ok(session) => Some(session),
            Err(InitError::Disabled) => {
                debug!("network capture disabled by configuration");
                None
            }
            Err(err) => {
                warn!(error = %err, "network capture unavailable, continuing without it");
                None
            }
        }
    }

    fn launch(
        config: &CaptureConfig,
        store: Box<dyn Storage>,
        store_path: Option<PathBuf>,
    ) -> Result<Self, InitError> {
        let first_id = store.last_id().map_or(1, |id| id + 1);
        let buffer = Arc::new(StagingBuffer::new(
            config.flush_threshold,
            config.max_pending,
            first_id,
        ));
        let counters = Arc::new(FlushCounters::default());
        let policy = FlushPolicy {
            interval: config.flush_interval(),
            max_store_bytes: config.max_store_bytes,
            retain_ratio: config.retain_ratio,
        };
        let flusher = Flusher::spawn(buffer.clone(), store, policy, counters.clone())
            .map_err(InitError::Spawn)?;

        let process_tag = config.process_tag.clone().unwrap_or_else(default_process_tag);
        info!(
            store = ?store_path,
            process_tag = %process_tag,
            first_id,
            "network capture started"
        );

        Ok(Self {
            handle: CaptureHandle {
                shared: Arc::new(Shared {
                    buffer,
                    enabled: AtomicBool::new(true),
                    limits: config.limits,
                    process_tag,
                }),
            },
            flusher,
            counters,
            store_path,
            stopped: false,
        })
    }

    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    /// pause or resume recording without tearing the session down
    pub fn set_enabled(&self, enabled: bool) {
        if !self.stopped {
            self.handle.shared.enabled.store(enabled, Ordering::Relaxed);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    pub fn process_tag(&self) -> &str {
        self.handle.process_tag()
    }

    /// `None` when the session runs over a caller-supplied store
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    pub fn stats(&self) -> FlushStats {
        self.counters.snapshot(&self.handle.shared.buffer)
    }

    /// write everything buffered so far, waiting up to `timeout`
    pub fn flush(&self, timeout: Duration) -> bool {
        self.handle.shared.buffer.flush(timeout)
    }

    /// Stop accepting entries, let the flusher write what is buffered, and
    /// wait for it. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.handle.shared.enabled.store(false, Ordering::Relaxed);
        self.handle.shared.buffer.close();
        self.flusher.join();

        let stats = self.stats();
        info!(
            written = stats.entries_written,
            lost = stats.entries_lost,
            dropped = stats.entries_dropped,
            "network capture stopped"
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn default_process_tag() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}-{}", std::process::id(), millis)
}
