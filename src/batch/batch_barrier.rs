use crate::invocation::run_shielded;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

type BarrierCallback = Box<dyn FnOnce(bool) + Send>;

struct BarrierInner {
    /// Outstanding participants, plus one initiation guard held by the
    /// builder. The guard prevents the gate from firing while connections
    /// are still being enumerated.
    pending: usize,
    /// Starts true; cleared by the first participant that did not send
    /// synchronously. The gate reports synchronous completion only when
    /// every participant sent synchronously.
    sent_synchronously: bool,
    completion: Option<BarrierCallback>,
    fired: bool,
}

/// Reference-counted completion gate for a multi-connection batch flush.
///
/// Built through [`FlushBarrierBuilder`], which holds the initiation guard
/// until the caller finishes enumerating connections; the gate fires its
/// completion callback exactly once, when the last participant (or the
/// builder) releases its count.
pub struct FlushBarrier {
    inner: Mutex<BarrierInner>,
    monitor: Condvar,
}

impl FlushBarrier {
    fn lock(&self) -> MutexGuard<'_, BarrierInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn decrement(&self, sent_synchronously: bool) {
        let fired = {
            let mut inner = self.lock();
            if !sent_synchronously {
                inner.sent_synchronously = false;
            }
            debug_assert!(inner.pending > 0);
            inner.pending -= 1;
            if inner.pending > 0 || inner.fired {
                None
            } else {
                inner.fired = true;
                self.monitor.notify_all();
                Some((inner.completion.take(), inner.sent_synchronously))
            }
        };

        if let Some((completion, all_synchronous)) = fired {
            if let Some(cb) = completion {
                run_shielded("flush completion", move || cb(all_synchronous));
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.lock().fired
    }

    /// Blocks until the gate has fired; returns whether every participant
    /// completed synchronously.
    pub fn wait_done(&self) -> bool {
        let mut inner = self.lock();
        while !inner.fired {
            inner = self.monitor.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
        inner.sent_synchronously
    }
}

/// Builder stage of a [`FlushBarrier`]. Holding the initiation count in a
/// consuming builder makes the "done enumerating" step mandatory: the live
/// barrier only exists once [`ready`](Self::ready) has run.
pub struct FlushBarrierBuilder {
    barrier: Arc<FlushBarrier>,
}

impl FlushBarrierBuilder {
    /// Starts the gate with a count of one: the initiation guard released
    /// by `ready`. `on_complete` receives whether every participant sent
    /// synchronously.
    pub fn new<F>(on_complete: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        Self {
            barrier: Arc::new(FlushBarrier {
                inner: Mutex::new(BarrierInner {
                    pending: 1,
                    sent_synchronously: true,
                    completion: Some(Box::new(on_complete)),
                    fired: false,
                }),
                monitor: Condvar::new(),
            }),
        }
    }

    /// Registers one participating connection flush, incrementing the
    /// count before the flush starts.
    pub fn register(&self) -> FlushTicket {
        self.barrier.lock().pending += 1;
        FlushTicket {
            barrier: Arc::clone(&self.barrier),
            completed: false,
        }
    }

    /// Marks enumeration complete and releases the initiation guard. This
    /// may fire the gate if all registered participants already finished.
    pub fn ready(self) -> Arc<FlushBarrier> {
        let barrier = Arc::clone(&self.barrier);
        barrier.decrement(true);
        barrier
    }
}

/// One participant's share of the gate. Completing it decrements the
/// count; a ticket dropped without completing counts as an asynchronous
/// completion so the gate can never hang.
pub struct FlushTicket {
    barrier: Arc<FlushBarrier>,
    completed: bool,
}

impl FlushTicket {
    pub fn complete(mut self, sent_synchronously: bool) {
        self.completed = true;
        self.barrier.decrement(sent_synchronously);
    }
}

impl Drop for FlushTicket {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!("flush ticket dropped without completion");
            self.barrier.decrement(false);
        }
    }
}
