use crate::batch::FlushTicket;
use crate::invocation::RpcFailure;
use crate::invocation::invocation_call::{CompletionCallback, SentCallback};
use crate::proto::Reply;
use crate::transport::{InvocationObserver, RequestHandler, TimerRegistration};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

// State bitset, monotonically set. An invocation only ever moves forward:
// Pending (no bits) -> Sent -> Done, with Ok/WaitCalled/BuffersReclaimed as
// orthogonal flags.
pub(crate) const STATE_OK: u8 = 0x1;
pub(crate) const STATE_DONE: u8 = 0x2;
pub(crate) const STATE_SENT: u8 = 0x4;
pub(crate) const STATE_WAIT_CALLED: u8 = 0x8;
pub(crate) const STATE_BUFFERS_RECLAIMED: u8 = 0x10;

/// Mutable state of one invocation, protected by the monitor in
/// [`StateCore`]. All transitions happen under the lock; user callbacks
/// never run while it is held.
pub(crate) struct StateInner {
    pub bits: u8,
    pub failure: Option<RpcFailure>,
    pub reply: Option<Reply>,

    /// Owned outbound buffer; mutable until handed to the transport.
    pub outgoing: Vec<u8>,
    /// Raw inbound buffer, allocated lazily when a reply arrives.
    pub incoming: Option<Vec<u8>>,

    /// True when the send completed synchronously on the caller's own
    /// invoke stack.
    pub sent_synchronously: bool,
    /// True when the invocation reached Done on the caller's own invoke
    /// stack (oneway sync send, batch append).
    pub completed_synchronously: bool,
    /// Whether any bytes of the current attempt reached the wire; input to
    /// the retry policy.
    pub any_bytes_sent: bool,
    pub attempts: u32,

    pub sent_cb: Option<SentCallback>,
    pub sent_registered: bool,
    pub completion_cb: Option<CompletionCallback>,
    pub completion_registered: bool,

    /// Handle used for the current attempt; its connection id is the
    /// affinity key for callback dispatch.
    pub cached_handler: Option<Arc<dyn RequestHandler>>,
    /// Handle remembered so the deadline task can cancel this specific
    /// pending request.
    pub timeout_handler: Option<Arc<dyn RequestHandler>>,
    pub timer: Option<Box<dyn TimerRegistration>>,

    pub observer: Option<Box<dyn InvocationObserver>>,
    pub flush_ticket: Option<FlushTicket>,
}

impl StateInner {
    #[inline]
    pub fn has(&self, bit: u8) -> bool {
        self.bits & bit != 0
    }

    /// Takes the armed deadline, if any, so the caller can revoke it after
    /// releasing the lock. Revoking under the lock could deadlock against
    /// a concurrently firing timer task.
    pub fn disarm_deadline(&mut self) -> Option<Box<dyn TimerRegistration>> {
        self.timeout_handler = None;
        self.timer.take()
    }

    pub fn affinity(&self) -> Option<u64> {
        self.cached_handler.as_ref().map(|h| h.connection_id())
    }
}

/// Monitor (mutex + condition variable) shared by all threads touching one
/// invocation: the caller thread, the transport's dispatch thread, the
/// timer thread and the retry queue.
pub(crate) struct StateCore {
    inner: Mutex<StateInner>,
    monitor: Condvar,
}

impl StateCore {
    pub fn new(outgoing: Vec<u8>, observer: Option<Box<dyn InvocationObserver>>) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                bits: 0,
                failure: None,
                reply: None,
                outgoing,
                incoming: None,
                sent_synchronously: false,
                completed_synchronously: false,
                any_bytes_sent: false,
                attempts: 0,
                sent_cb: None,
                sent_registered: false,
                completion_cb: None,
                completion_registered: false,
                cached_handler: None,
                timeout_handler: None,
                timer: None,
                observer,
                flush_ticket: None,
            }),
            monitor: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Broadcast wakeup; safe with multiple concurrent waiters.
    pub fn notify_all(&self) {
        self.monitor.notify_all();
    }

    /// Blocks the calling thread until `pred` holds. Spurious wakeups are
    /// absorbed by re-testing the predicate.
    pub fn wait_until<'a, F>(
        &self,
        mut guard: MutexGuard<'a, StateInner>,
        pred: F,
    ) -> MutexGuard<'a, StateInner>
    where
        F: Fn(&StateInner) -> bool,
    {
        while !pred(&guard) {
            guard = self
                .monitor
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
        guard
    }
}

/// Runs a user-supplied callback, catching any panic. A misbehaving
/// callback must never corrupt invocation state or propagate into
/// transport code; panics are logged and swallowed.
pub(crate) fn run_shielded<F: FnOnce()>(label: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("panic escaped user {} callback; ignored", label);
    }
}
