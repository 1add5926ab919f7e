//! # flusher
//!
//! why: move buffered entries to disk off the request path
//! relations: owns the Storage for a session; drains buffer.rs
//! what: Flusher thread, FlushPolicy, FlushStats counters

use crate::buffer::StagingBuffer;
use netlog_core::LogEntry;
use netlog_storage::Storage;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// When the flusher writes and how much it keeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushPolicy {
    pub interval: Duration,
    pub max_store_bytes: u64,
    /// fraction of `max_store_bytes` kept after a compaction
    pub retain_ratio: f64,
}

impl FlushPolicy {
    fn compaction_target(&self) -> u64 {
        (self.max_store_bytes as f64 * self.retain_ratio) as u64
    }
}

/// Snapshot of what a session's flusher has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub batches_written: u64,
    pub entries_written: u64,
    pub batches_failed: u64,
    /// entries lost with failed batches
    pub entries_lost: u64,
    /// entries evicted from a full staging buffer
    pub entries_dropped: u64,
    pub compactions: u64,
    /// entries waiting in the staging buffer
    pub pending: u64,
}

#[derive(Default)]
pub(crate) struct FlushCounters {
    batches_written: AtomicU64,
    entries_written: AtomicU64,
    batches_failed: AtomicU64,
    entries_lost: AtomicU64,
    compactions: AtomicU64,
}

impl FlushCounters {
    pub(crate) fn snapshot(&self, buffer: &StagingBuffer) -> FlushStats {
        FlushStats {
            batches_written: self.batches_written.load(Ordering::Relaxed),
            entries_written: self.entries_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            entries_lost: self.entries_lost.load(Ordering::Relaxed),
            entries_dropped: buffer.dropped(),
            compactions: self.compactions.load(Ordering::Relaxed),
            pending: buffer.len() as u64,
        }
    }
}

/// Background writer. The only code that touches the store after start.
pub(crate) struct Flusher {
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    pub(crate) fn spawn(
        buffer: Arc<StagingBuffer>,
        store: Box<dyn Storage>,
        policy: FlushPolicy,
        counters: Arc<FlushCounters>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("netlog-flusher".to_string())
            .spawn(move || run(&buffer, store, policy, &counters))?;
        Ok(Self { handle: Some(handle) })
    }

    /// wait for the final drain; the buffer must already be closed
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("capture flusher panicked, buffered entries lost");
            }
        }
    }
}

fn run(
    buffer: &StagingBuffer,
    mut store: Box<dyn Storage>,
    policy: FlushPolicy,
    counters: &FlushCounters,
) {
    loop {
        let batch = buffer.wait_batch(policy.interval);
        if !batch.entries.is_empty() {
            write_batch(store.as_mut(), batch.entries, &policy, counters);
        }
        buffer.complete(batch.ticket);

        if batch.closed {
            debug!("capture flusher finished final drain");
            return;
        }
    }
}

fn write_batch(
    store: &mut dyn Storage,
    entries: Vec<LogEntry>,
    policy: &FlushPolicy,
    counters: &FlushCounters,
) {
    let count = entries.len() as u64;
    match store.append(&entries) {
        Ok(appended) => {
            let skipped = appended.skipped.len() as u64;
            counters.batches_written.fetch_add(1, Ordering::Relaxed);
            counters.entries_written.fetch_add(count - skipped, Ordering::Relaxed);
            counters.entries_lost.fetch_add(skipped, Ordering::Relaxed);
            debug!(
                entries = count - skipped,
                skipped,
                start = appended.range.start,
                end = appended.range.end,
                "flushed capture batch"
            );
        }
        Err(err) => {
            // failed batches are never retried
            counters.batches_failed.fetch_add(1, Ordering::Relaxed);
            counters.entries_lost.fetch_add(count, Ordering::Relaxed);
            warn!(error = %err, lost = count, "dropping capture batch after store failure");
            return;
        }
    }

    if store.size() > policy.max_store_bytes {
        match store.compact(policy.compaction_target()) {
            Ok(stats) => {
                counters.compactions.fetch_add(1, Ordering::Relaxed);
                info!(
                    dropped = stats.frames_dropped,
                    bytes_after = stats.bytes_after,
                    "capture store over its ceiling, compacted"
                );
            }
            Err(err) => warn!(error = %err, "capture store compaction failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlog_core::{encode, Headers, Outcome, RawCapture};
    use netlog_storage::InMemoryStore;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn entry(id: u64) -> LogEntry {
        encode(
            RawCapture {
                method: "GET".into(),
                url: format!("https://example.com/{id}"),
                request_headers: Headers::new(),
                request_body: None,
                outcome: Outcome::Cancelled,
                started_at: SystemTime::now(),
                duration: Duration::from_millis(1),
                process_tag: "t".into(),
            },
            &Default::default(),
        )
        .seal(id)
    }

    #[test]
    fn compaction_target_scales_ceiling() {
        let policy = FlushPolicy {
            interval: Duration::from_secs(1),
            max_store_bytes: 1000,
            retain_ratio: 0.75,
        };
        assert_eq!(policy.compaction_target(), 750);
    }

    #[test]
    fn flusher_drains_everything_on_close() {
        let buffer = Arc::new(StagingBuffer::new(1000, 10_000, 1));
        let store = InMemoryStore::new();
        let counters = Arc::new(FlushCounters::default());
        let policy = FlushPolicy {
            interval: Duration::from_secs(60),
            max_store_bytes: u64::MAX,
            retain_ratio: 1.0,
        };
        let mut flusher =
            Flusher::spawn(buffer.clone(), Box::new(store.clone()), policy, counters.clone())
                .unwrap();

        for i in 0..10 {
            buffer.push(encode(
                RawCapture {
                    method: "GET".into(),
                    url: format!("https://example.com/{i}"),
                    request_headers: Headers::new(),
                    request_body: None,
                    outcome: Outcome::Cancelled,
                    started_at: SystemTime::now(),
                    duration: Duration::from_millis(1),
                    process_tag: "t".into(),
                },
                &Default::default(),
            ));
        }
        buffer.close();
        flusher.join();

        assert_eq!(store.entries().len(), 10);
        assert_eq!(counters.snapshot(&buffer).entries_written, 10);
    }

    #[test]
    fn unserializable_entries_count_as_lost() {
        let mut store = InMemoryStore::new();
        let counters = FlushCounters::default();
        let policy = FlushPolicy {
            interval: Duration::from_secs(1),
            max_store_bytes: u64::MAX,
            retain_ratio: 1.0,
        };

        let mut bad = entry(2);
        bad.started_at = UNIX_EPOCH - Duration::from_secs(5);
        write_batch(&mut store, vec![entry(1), bad, entry(3)], &policy, &counters);

        let stats = counters.snapshot(&StagingBuffer::new(1, 1, 1));
        assert_eq!(stats.entries_written, 2);
        assert_eq!(stats.entries_lost, 1);
        assert_eq!(store.entries().len(), 2);
    }
}
