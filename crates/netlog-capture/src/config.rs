//! # config
//!
//! why: collect every capture knob in one place, read once when a session starts
//! relations: consumed by session.rs; supplied by the host through ConfigSource
//! what: CaptureConfig with serde defaults, ConfigSource trait

use crate::error::InitError;
use netlog_core::CodecLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Capture settings. Missing fields in JSON fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture is off unless the host turns it on.
    pub enabled: bool,
    /// Directory shared with the reading process.
    pub storage_root: PathBuf,
    pub file_name: String,
    /// Buffered entries that trigger a flush.
    pub flush_threshold: usize,
    /// Longest time buffered entries wait for a flush.
    pub flush_interval_ms: u64,
    /// Buffered entries kept before the oldest are evicted.
    pub max_pending: usize,
    /// Store size that triggers compaction.
    pub max_store_bytes: u64,
    /// Fraction of `max_store_bytes` kept after compaction.
    pub retain_ratio: f64,
    pub limits: CodecLimits,
    /// Defaults to `<pid>-<start millis>`.
    pub process_tag: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_root: std::env::temp_dir().join("netlog"),
            file_name: "netlog.log".to_string(),
            flush_threshold: 64,
            flush_interval_ms: 1000,
            max_pending: 10_000,
            max_store_bytes: 8 * 1024 * 1024,
            retain_ratio: 0.75,
            limits: CodecLimits::default(),
            process_tag: None,
        }
    }
}

impl CaptureConfig {
    /// enabled config writing under `storage_root`, defaults otherwise
    pub fn enabled_at(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn store_path(&self) -> PathBuf {
        self.storage_root.join(&self.file_name)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), InitError> {
        let problem = if self.file_name.is_empty() {
            "file_name is empty"
        } else if self.flush_threshold == 0 {
            "flush_threshold must be at least 1"
        } else if self.flush_interval_ms == 0 {
            "flush_interval_ms must be at least 1"
        } else if self.max_pending < self.flush_threshold {
            "max_pending must be at least flush_threshold"
        } else if self.max_store_bytes == 0 {
            "max_store_bytes must be at least 1"
        } else if !(self.retain_ratio > 0.0 && self.retain_ratio <= 1.0) {
            "retain_ratio must be in (0, 1]"
        } else {
            return Ok(());
        };
        Err(InitError::InvalidConfig(problem.to_string()))
    }
}

/// The host's configuration capability.
pub trait ConfigSource {
    fn capture_config(&self) -> CaptureConfig;
}

impl ConfigSource for CaptureConfig {
    fn capture_config(&self) -> CaptureConfig {
        self.clone()
    }
}
