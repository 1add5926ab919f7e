//! # buffer
//!
//! why: absorb bursts of completions without making callers wait on disk
//! relations: fed by CaptureHandle (session.rs), drained by the flusher thread
//! what: StagingBuffer, a double-buffered, bounded queue that also hands out ids

use netlog_core::{EntryDraft, LogEntry};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// What happened to a pushed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted { id: u64 },
    /// Accepted, but the buffer was full and its oldest entry was evicted.
    OverheadExceeded { id: u64, evicted: u64 },
    /// The buffer is closed; nothing was stored.
    Rejected,
}

/// One drained batch handed to the flusher.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) entries: Vec<LogEntry>,
    pub(crate) closed: bool,
    pub(crate) ticket: u64,
}

struct BufferState {
    active: VecDeque<LogEntry>,
    next_id: u64,
    closed: bool,
    /// explicit flush requests issued / drained / written
    requested: u64,
    taken: u64,
    completed: u64,
}

/// Staging area between capture and the durable store.
///
/// `push` holds the lock only to assign an id and move the sealed entry in.
/// `drain` swaps the whole queue out, so entries keep accumulating in a
/// fresh queue while the previous one is being written.
pub struct StagingBuffer {
    state: Mutex<BufferState>,
    ready: Condvar,
    flushed: Condvar,
    threshold: usize,
    max_pending: usize,
    dropped: AtomicU64,
}

impl StagingBuffer {
    /// `threshold` entries trigger a flush; at most `max_pending` are held
    pub fn new(threshold: usize, max_pending: usize, first_id: u64) -> Self {
        let threshold = threshold.max(1);
        Self {
            state: Mutex::new(BufferState {
                active: VecDeque::with_capacity(threshold),
                next_id: first_id,
                closed: false,
                requested: 0,
                taken: 0,
                completed: 0,
            }),
            ready: Condvar::new(),
            flushed: Condvar::new(),
            threshold,
            max_pending: max_pending.max(threshold),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, draft: EntryDraft) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Rejected;
        }

        let id = state.next_id;
        state.next_id += 1;
        let evicted = if state.active.len() >= self.max_pending {
            state.active.pop_front().map(|e| e.id)
        } else {
            None
        };
        state.active.push_back(draft.seal(id));
        let full = state.active.len() >= self.threshold;
        drop(state);

        if full {
            self.ready.notify_one();
        }

        match evicted {
            None => PushOutcome::Accepted { id },
            Some(evicted) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 || total % 1000 == 0 {
                    warn!(
                        dropped_total = total,
                        max_pending = self.max_pending,
                        "capture outpacing store, dropping oldest buffered entries"
                    );
                }
                PushOutcome::OverheadExceeded { id, evicted }
            }
        }
    }

    /// swap out everything buffered so far
    pub fn drain(&self) -> Vec<LogEntry> {
        let taken = std::mem::take(&mut self.state.lock().active);
        Vec::from(taken)
    }

    /// stop accepting entries and wake the flusher for its final drain
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
        self.flushed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// entries evicted because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// id the next accepted entry will get
    pub fn next_id(&self) -> u64 {
        self.state.lock().next_id
    }

    /// Ask for an immediate flush and wait up to `timeout` for it to land.
    /// Returns false on timeout or if the buffer is closed.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.requested += 1;
        let ticket = state.requested;
        self.ready.notify_one();

        while state.completed < ticket {
            if self.flushed.wait_until(&mut state, deadline).timed_out() {
                return state.completed >= ticket;
            }
        }
        true
    }

    /// Block until a flush is due: threshold reached, a flush was requested,
    /// the buffer closed, or `interval` elapsed.
    pub(crate) fn wait_batch(&self, interval: Duration) -> Batch {
        let deadline = Instant::now() + interval;
        let mut state = self.state.lock();
        loop {
            let due = state.closed
                || state.active.len() >= self.threshold
                || state.requested > state.taken;
            if due || self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }

        state.taken = state.requested;
        let (taken, closed, ticket) = (std::mem::take(&mut state.active), state.closed, state.taken);
        drop(state);

        // a wrapped deque is made contiguous here, outside the lock
        Batch { entries: Vec::from(taken), closed, ticket }
    }

    /// mark flush requests up to `ticket` as written
    pub(crate) fn complete(&self, ticket: u64) {
        let mut state = self.state.lock();
        state.completed = state.completed.max(ticket);
        drop(state);
        self.flushed.notify_all();
    }
}
