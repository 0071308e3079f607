use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard};

struct BatchQueueInner {
    buffer: Vec<u8>,
    request_count: u32,
    append_in_progress: bool,
    /// Buffer length at `begin_append`, for rollback on abort.
    mark: usize,
}

/// Shared buffer into which multiple logical batch calls append their
/// encoded bodies. One queue exists per (proxy, handler) pair; a transport
/// handler embeds it to back its batch-append hooks.
///
/// Appenders are serialized: `begin_append` blocks while another append is
/// open, and every `begin_append` is paired with exactly one
/// `commit_append` or `abort_append`. Flushing drains the buffer exactly
/// once; a queue dropped with queued requests is surfaced in the log, not
/// silently discarded.
pub struct BatchQueue {
    inner: Mutex<BatchQueueInner>,
    monitor: Condvar,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BatchQueueInner {
                buffer: Vec::new(),
                request_count: 0,
                append_in_progress: false,
                mark: 0,
            }),
            monitor: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchQueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the buffer for one append, blocking while another append is
    /// open.
    pub fn begin_append(&self) {
        let mut inner = self.lock();
        while inner.append_in_progress {
            inner = self.monitor.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
        inner.append_in_progress = true;
        inner.mark = inner.buffer.len();
    }

    pub fn commit_append(&self, encoded: &[u8]) {
        let mut inner = self.lock();
        debug_assert!(inner.append_in_progress);
        inner.buffer.extend_from_slice(encoded);
        inner.request_count += 1;
        inner.append_in_progress = false;
        self.monitor.notify_all();
    }

    /// Rolls the buffer back to the state before `begin_append`.
    pub fn abort_append(&self) {
        let mut inner = self.lock();
        debug_assert!(inner.append_in_progress);
        let mark = inner.mark;
        inner.buffer.truncate(mark);
        inner.append_in_progress = false;
        self.monitor.notify_all();
    }

    /// Drains the queued requests for one flush. Returns `None` when
    /// nothing is queued. Waits out any append that is still open so a
    /// half-written request is never flushed.
    pub fn take_for_flush(&self) -> Option<(Vec<u8>, u32)> {
        let mut inner = self.lock();
        while inner.append_in_progress {
            inner = self.monitor.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
        if inner.request_count == 0 {
            return None;
        }
        let buffer = mem::take(&mut inner.buffer);
        let count = mem::replace(&mut inner.request_count, 0);
        Some((buffer, count))
    }

    pub fn request_count(&self) -> u32 {
        self.lock().request_count
    }

    pub fn is_empty(&self) -> bool {
        self.request_count() == 0
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if inner.request_count > 0 {
            tracing::error!(
                "batch queue dropped with {} unflushed request(s)",
                inner.request_count
            );
        }
    }
}
