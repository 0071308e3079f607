use crate::batch::FlushTicket;
use crate::invocation::invocation_state::{
    STATE_BUFFERS_RECLAIMED, STATE_DONE, STATE_OK, STATE_SENT, STATE_WAIT_CALLED, StateCore,
    run_shielded,
};
use crate::invocation::{CallMode, CallbackMisuse, RpcFailure};
use crate::proto::{Reply, ReplyStatus, RequestEnvelope, decode_reply};
use crate::transport::{
    HandlerProvider, InvocationServices, RequestHandler, RetryDecision, SendError, SendOutcome,
};
use crate::utils::{BufferPool, generate_request_id};
use std::mem;
use std::sync::Arc;

/// Notified once when the request has been handed to the transport; the
/// argument is whether the send completed synchronously.
pub type SentCallback = Box<dyn FnOnce(bool) + Send>;

/// Terminal outcome of an invocation: a decoded reply (`Ok` or
/// `UserException` status) or a typed failure.
pub type CallResult = Result<Reply, RpcFailure>;

/// Notified exactly once when the invocation completes.
pub type CompletionCallback = Box<dyn FnOnce(CallResult) + Send>;

/// What the invoke loop hands to the transport: a marshaled request, or a
/// flush of the handler's queued batch requests.
enum InvokeKind {
    Request,
    BatchFlush,
}

enum RetryStep {
    Now,
    Queued,
    GiveUp(RpcFailure),
}

/// One outstanding logical remote call, tracked end-to-end.
///
/// The invocation is shared between the caller thread, the transport's
/// dispatch thread, the deadline timer and the retry queue; all of them
/// synchronize on the internal monitor. Completion is exactly-once: the
/// first trigger (reply, failure, timeout, cancellation) to take the
/// monitor wins and every later trigger observes `Done` and becomes a
/// no-op.
pub struct Invocation {
    kind: InvokeKind,
    operation: String,
    mode: CallMode,
    request_id: u32,
    provider: Arc<dyn HandlerProvider>,
    services: InvocationServices,
    state: StateCore,
}

impl Invocation {
    /// Creates an invocation with its request envelope and parameter
    /// payload already marshaled into the owned outbound buffer.
    pub fn new(
        provider: Arc<dyn HandlerProvider>,
        services: InvocationServices,
        envelope: RequestEnvelope,
        params: &[u8],
    ) -> Arc<Self> {
        let observer = services
            .observers
            .as_ref()
            .and_then(|f| f.for_remote_call(&envelope.operation, envelope.mode));
        if let Some(o) = observer.as_ref() {
            o.attach();
        }

        let mut outgoing = Vec::new();
        envelope.encode(&mut outgoing);
        outgoing.extend_from_slice(params);

        Arc::new(Self {
            kind: InvokeKind::Request,
            operation: envelope.operation,
            mode: envelope.mode,
            request_id: generate_request_id(),
            provider,
            services,
            state: StateCore::new(outgoing, observer),
        })
    }

    /// Creates a flush invocation over the same state machine. The flush
    /// has no envelope of its own; it hands the handler's queued batch
    /// buffer to the transport. An optional barrier ticket is completed
    /// when the flush finishes.
    pub(crate) fn new_flush(
        provider: Arc<dyn HandlerProvider>,
        services: InvocationServices,
        ticket: Option<FlushTicket>,
    ) -> Arc<Self> {
        let operation = "flushBatchRequests";
        let observer = services
            .observers
            .as_ref()
            .and_then(|f| f.for_remote_call(operation, CallMode::Oneway));
        if let Some(o) = observer.as_ref() {
            o.attach();
        }

        let flush = Arc::new(Self {
            kind: InvokeKind::BatchFlush,
            operation: operation.to_string(),
            mode: CallMode::Oneway,
            request_id: 0,
            provider,
            services,
            state: StateCore::new(Vec::new(), observer),
        });
        if ticket.is_some() {
            flush.state.lock().flush_ticket = ticket;
        }
        flush
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    /// Correlation id the transport uses to route the reply back here.
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().has(STATE_DONE)
    }

    pub fn is_sent(&self) -> bool {
        self.state.lock().has(STATE_SENT)
    }

    pub fn sent_synchronously(&self) -> bool {
        self.state.lock().sent_synchronously
    }

    pub fn failure(&self) -> Option<RpcFailure> {
        self.state.lock().failure.clone()
    }

    /// Gives the transport read access to the marshaled request. The
    /// closure runs under the invocation's monitor and must not call back
    /// into the invocation.
    pub fn with_marshaled_request<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.state.lock();
        f(&inner.outgoing)
    }

    /// Takes the decoded reply, once, after completion. `None` while
    /// pending, after a failure, or when a completion callback already
    /// consumed it.
    pub fn take_reply(&self) -> Option<Reply> {
        let mut inner = self.state.lock();
        if inner.has(STATE_DONE) { inner.reply.take() } else { None }
    }

    // --- blocking operations -------------------------------------------

    /// Suspends the calling thread until the request has been handed to
    /// the transport, or the invocation failed before it could be.
    pub fn wait_sent(&self) {
        let guard = self.state.lock();
        self.state
            .wait_until(guard, |s| s.has(STATE_SENT) || s.failure.is_some());
    }

    /// Suspends the calling thread until the invocation is done. Safe to
    /// call from multiple threads concurrently.
    pub fn wait_done(&self) {
        let guard = self.state.lock();
        self.state.wait_until(guard, |s| s.has(STATE_DONE));
    }

    /// Blocks until done, then returns the success flag or raises the
    /// stored failure. Usable once per invocation; a second call is a
    /// `CallbackMisuse` failure.
    pub fn blocking_wait(&self) -> Result<bool, RpcFailure> {
        let mut guard = self.state.lock();
        if guard.has(STATE_WAIT_CALLED) {
            return Err(CallbackMisuse::WaitAlreadyConsumed.into());
        }
        guard.bits |= STATE_WAIT_CALLED;
        let guard = self.state.wait_until(guard, |s| s.has(STATE_DONE));
        match guard.failure.clone() {
            Some(f) => Err(f),
            None => Ok(guard.has(STATE_OK)),
        }
    }

    // --- callback registration -----------------------------------------

    /// Registers the sent callback. If the request was already sent, the
    /// callback fires now: inline when the send completed synchronously on
    /// this thread's own invoke stack, otherwise through the dispatcher.
    pub fn register_sent_callback<F>(self: &Arc<Self>, cb: F) -> Result<(), CallbackMisuse>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let (sent_synchronously, affinity) = {
            let mut inner = self.state.lock();
            if inner.sent_registered {
                return Err(CallbackMisuse::AlreadyRegistered);
            }
            inner.sent_registered = true;
            if !inner.has(STATE_SENT) {
                // Fires on send; never fires if the invocation fails
                // before anything reaches the wire.
                inner.sent_cb = Some(Box::new(cb));
                return Ok(());
            }
            (inner.sent_synchronously, inner.affinity())
        };
        self.deliver_sent(Box::new(cb), sent_synchronously, sent_synchronously, affinity);
        Ok(())
    }

    /// Registers the completion callback. If the invocation is already
    /// done, the callback fires now, per the same synchronicity rule as
    /// `register_sent_callback`.
    pub fn register_completion_callback<F>(self: &Arc<Self>, cb: F) -> Result<(), CallbackMisuse>
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let (outcome, inline, affinity) = {
            let mut inner = self.state.lock();
            if inner.completion_registered {
                return Err(CallbackMisuse::AlreadyRegistered);
            }
            inner.completion_registered = true;
            if !inner.has(STATE_DONE) {
                inner.completion_cb = Some(Box::new(cb));
                return Ok(());
            }
            let outcome = match inner.failure.clone() {
                Some(f) => Err(f),
                None => Ok(inner.reply.take().unwrap_or_else(Reply::success)),
            };
            (outcome, inner.completed_synchronously, inner.affinity())
        };
        self.deliver_completion(Box::new(cb), outcome, inline, affinity);
        Ok(())
    }

    // --- invoke loop ----------------------------------------------------

    /// Runs the invocation: batch modes append to the handler's batch
    /// buffer and complete immediately; everything else loops acquiring a
    /// transport handle and offering itself to it, retrying per the retry
    /// policy. Returns whether the send completed synchronously.
    ///
    /// `synchronous` is true only when called on the application's own
    /// thread (as opposed to a retry-queue or dispatcher thread).
    pub fn invoke(self: &Arc<Self>, synchronous: bool) -> bool {
        match self.invoke_loop(synchronous) {
            Ok(sent_synchronously) => sent_synchronously,
            Err(f) => {
                self.finalize(f);
                false
            }
        }
    }

    /// Entry point for the delayed-retry queue.
    pub fn retry(self: &Arc<Self>) {
        let _ = self.invoke(false);
    }

    fn invoke_loop(self: &Arc<Self>, synchronous: bool) -> Result<bool, RpcFailure> {
        if self.mode.is_batch() {
            return self.append_to_batch(synchronous);
        }

        let expects_reply = self.mode.expects_reply();
        let compress = self.provider.compress();

        loop {
            let handler = match self.provider.request_handler() {
                Ok(h) => h,
                Err(f) => {
                    if matches!(self.kind, InvokeKind::BatchFlush) || !f.is_retryable() {
                        return Err(f);
                    }
                    match self.consult_retry_policy(f) {
                        RetryStep::Now => continue,
                        RetryStep::Queued => return Ok(false),
                        RetryStep::GiveUp(g) => return Err(g),
                    }
                }
            };

            {
                let mut inner = self.state.lock();
                inner.cached_handler = Some(Arc::clone(&handler));
                // The retry policy only cares about bytes of the current
                // attempt.
                inner.any_bytes_sent = false;
            }

            let attempt = match self.kind {
                InvokeKind::Request => handler.offer_collocated(self).and_then(|accepted| {
                    if accepted {
                        Ok(SendOutcome { sent: true })
                    } else {
                        handler.send(self, compress, expects_reply)
                    }
                }),
                InvokeKind::BatchFlush => handler.send_batch(self),
            };

            match attempt {
                Ok(outcome) => {
                    if outcome.sent {
                        self.mark_sent(synchronous);
                    }
                    if expects_reply || !outcome.sent {
                        self.arm_deadline(&handler);
                    }
                    return Ok(self.state.lock().sent_synchronously);
                }
                Err(SendError::Stale) => {
                    self.provider.clear_request_handler(&handler);
                    if matches!(self.kind, InvokeKind::BatchFlush) {
                        // Nothing was queued on the handler we just
                        // dropped; the flush completes as a no-op.
                        self.mark_sent(synchronous);
                        return Ok(self.state.lock().sent_synchronously);
                    }
                    // Stale handles are not counted against the budget.
                    continue;
                }
                Err(SendError::Terminal(f)) => return Err(f),
                Err(SendError::Retryable(f)) => {
                    if matches!(self.kind, InvokeKind::BatchFlush) {
                        return Err(f);
                    }
                    match self.consult_retry_policy(f) {
                        RetryStep::Now => continue,
                        RetryStep::Queued => return Ok(false),
                        RetryStep::GiveUp(g) => return Err(g),
                    }
                }
            }
        }
    }

    fn append_to_batch(self: &Arc<Self>, synchronous: bool) -> Result<bool, RpcFailure> {
        loop {
            let handler = self.provider.request_handler()?;
            match handler.begin_batch_append() {
                Ok(()) => {
                    {
                        let mut inner = self.state.lock();
                        inner.cached_handler = Some(Arc::clone(&handler));
                    }
                    let committed = {
                        let inner = self.state.lock();
                        handler.commit_batch_append(&inner.outgoing)
                    };
                    return match committed {
                        Ok(()) => {
                            // The logical call completes at append time;
                            // the later flush is fire-and-forget for it.
                            self.mark_sent(synchronous);
                            Ok(self.state.lock().sent_synchronously)
                        }
                        Err(e) => {
                            handler.abort_batch_append();
                            Err(Self::send_failure(e))
                        }
                    };
                }
                Err(SendError::Stale) => {
                    self.provider.clear_request_handler(&handler);
                    continue;
                }
                Err(SendError::Retryable(f)) | Err(SendError::Terminal(f)) => {
                    self.provider.clear_request_handler(&handler);
                    return Err(f);
                }
            }
        }
    }

    fn send_failure(e: SendError) -> RpcFailure {
        match e {
            SendError::Stale => RpcFailure::RetryableTransport {
                reason: "request handler went stale".to_string(),
            },
            SendError::Retryable(f) | SendError::Terminal(f) => f,
        }
    }

    fn consult_retry_policy(self: &Arc<Self>, failure: RpcFailure) -> RetryStep {
        let (any_bytes_sent, attempts) = {
            let mut inner = self.state.lock();
            inner.attempts += 1;
            (inner.any_bytes_sent, inner.attempts)
        };
        let decision =
            self.services
                .retry_policy
                .decide(&failure, self.mode, any_bytes_sent, attempts);
        match decision {
            RetryDecision::Immediate => {
                tracing::debug!(
                    operation = %self.operation,
                    attempts,
                    kind = failure.kind(),
                    "retrying invocation"
                );
                self.note_retried();
                RetryStep::Now
            }
            RetryDecision::AfterDelay(delay_millis) => {
                tracing::debug!(
                    operation = %self.operation,
                    attempts,
                    delay_millis,
                    kind = failure.kind(),
                    "retrying invocation after delay"
                );
                self.note_retried();
                self.services
                    .retry_queue
                    .enqueue(Arc::clone(self), delay_millis);
                RetryStep::Queued
            }
            RetryDecision::GiveUp(g) => RetryStep::GiveUp(g),
        }
    }

    fn note_retried(&self) {
        let inner = self.state.lock();
        if let Some(o) = inner.observer.as_ref() {
            o.retried();
        }
    }

    // --- transport-facing notification entry points ---------------------

    /// Called by the transport once the queued request has been written.
    pub fn on_sent(self: &Arc<Self>) {
        self.mark_sent(false);
    }

    /// Called by the transport with the raw reply envelope.
    pub fn on_reply(self: &Arc<Self>, bytes: Vec<u8>) {
        debug_assert!(self.mode.expects_reply());
        let size = bytes.len();

        let failure = match decode_reply(&bytes) {
            Ok(reply) => {
                let (timer, completion, observer, affinity) = {
                    let mut inner = self.state.lock();
                    if inner.has(STATE_DONE) {
                        tracing::trace!(
                            request_id = self.request_id,
                            "reply for completed invocation ignored"
                        );
                        return;
                    }
                    let timer = inner.disarm_deadline();
                    if let Some(o) = inner.observer.as_ref() {
                        o.reply(size);
                        if reply.status == ReplyStatus::UserException {
                            o.user_exception();
                        }
                    }
                    inner.incoming = Some(bytes);
                    inner.bits |= STATE_SENT | STATE_DONE;
                    if reply.is_ok() {
                        inner.bits |= STATE_OK;
                    }
                    let completion = match inner.completion_cb.take() {
                        Some(cb) => Some((cb, Ok(reply))),
                        None => {
                            inner.reply = Some(reply);
                            None
                        }
                    };
                    let observer = inner.observer.take();
                    let affinity = inner.affinity();
                    self.state.notify_all();
                    (timer, completion, observer, affinity)
                };

                if let Some(t) = timer {
                    t.revoke();
                }
                if let Some((cb, outcome)) = completion {
                    self.deliver_completion(cb, outcome, false, affinity);
                }
                if let Some(o) = observer {
                    o.detach();
                }
                return;
            }
            Err(f) => f,
        };

        // Decoding failures are funneled into the common failure path.
        self.on_failure(failure);
    }

    /// Called by the transport when the request failed. Retryable failures
    /// go through the retry policy; everything else finalizes the
    /// invocation.
    pub fn on_failure(self: &Arc<Self>, failure: RpcFailure) {
        {
            let inner = self.state.lock();
            if inner.has(STATE_DONE) {
                tracing::trace!(
                    request_id = self.request_id,
                    kind = failure.kind(),
                    "failure for completed invocation ignored"
                );
                return;
            }
        }

        if matches!(self.kind, InvokeKind::BatchFlush) || !failure.is_retryable() {
            self.finalize(failure);
            return;
        }
        match self.consult_retry_policy(failure) {
            RetryStep::Now => {
                let _ = self.invoke(false);
            }
            RetryStep::Queued => {}
            RetryStep::GiveUp(f) => self.finalize(f),
        }
    }

    /// Called by the transport when a pending request was canceled, e.g.
    /// by the deadline or communicator shutdown. Never retried.
    pub fn on_canceled(self: &Arc<Self>, reason: RpcFailure) {
        self.finalize(reason);
    }

    // --- completion machinery -------------------------------------------

    /// Records the sent transition. For modes without a reply this is also
    /// the terminal transition. `synchronous` is true only on the caller's
    /// own invoke stack.
    fn mark_sent(self: &Arc<Self>, synchronous: bool) {
        let mut completion = None;
        let mut observer = None;
        let mut ticket = None;
        let (timer, sent_cb, sent_synchronously, affinity) = {
            let mut inner = self.state.lock();
            if inner.has(STATE_DONE) {
                // A concurrent failure or cancellation won; just record
                // that bytes made it out.
                inner.bits |= STATE_SENT;
                inner.any_bytes_sent = true;
                self.state.notify_all();
                return;
            }
            let already_sent = inner.has(STATE_SENT);
            inner.bits |= STATE_SENT;
            inner.any_bytes_sent = true;
            if synchronous {
                inner.sent_synchronously = true;
            }

            let mut timer = None;
            if !self.mode.expects_reply() {
                // Oneway, datagram, batch append and flush: done and sent
                // coincide.
                timer = inner.disarm_deadline();
                inner.bits |= STATE_DONE | STATE_OK;
                if synchronous {
                    inner.completed_synchronously = true;
                }
                completion = inner
                    .completion_cb
                    .take()
                    .map(|cb| (cb, Ok(inner.reply.take().unwrap_or_else(Reply::success))));
                observer = inner.observer.take();
                ticket = inner.flush_ticket.take();
            }

            let sent_cb = if already_sent { None } else { inner.sent_cb.take() };
            self.state.notify_all();
            (timer, sent_cb, inner.sent_synchronously, inner.affinity())
        };

        if let Some(t) = timer {
            t.revoke();
        }
        if let Some(t) = ticket {
            t.complete(synchronous);
        }
        if let Some(cb) = sent_cb {
            self.deliver_sent(cb, sent_synchronously, false, affinity);
        }
        if let Some((cb, outcome)) = completion {
            self.deliver_completion(cb, outcome, false, affinity);
        }
        if let Some(o) = observer {
            o.detach();
        }
    }

    /// Terminal failure transition. First trigger wins; later triggers
    /// observe `Done` and return.
    fn finalize(self: &Arc<Self>, failure: RpcFailure) {
        let (timer, completion, observer, ticket, affinity) = {
            let mut inner = self.state.lock();
            if inner.has(STATE_DONE) {
                return;
            }
            let timer = inner.disarm_deadline();
            inner.bits |= STATE_DONE;
            inner.failure = Some(failure.clone());
            let completion = inner.completion_cb.take();
            let observer = inner.observer.take();
            let ticket = inner.flush_ticket.take();
            let affinity = inner.affinity();
            self.state.notify_all();
            (timer, completion, observer, ticket, affinity)
        };

        if let Some(t) = timer {
            t.revoke();
        }
        if let Some(t) = ticket {
            t.complete(false);
        }
        if let Some(o) = observer {
            o.failed(failure.kind());
            o.detach();
        }
        if let Some(cb) = completion {
            self.deliver_completion(cb, Err(failure), false, affinity);
        }
    }

    fn deliver_sent(
        &self,
        cb: SentCallback,
        sent_synchronously: bool,
        inline: bool,
        affinity: Option<u64>,
    ) {
        if inline {
            run_shielded("sent", move || cb(sent_synchronously));
        } else {
            self.services.dispatcher.post(
                Box::new(move || run_shielded("sent", move || cb(sent_synchronously))),
                affinity,
            );
        }
    }

    fn deliver_completion(
        &self,
        cb: CompletionCallback,
        outcome: CallResult,
        inline: bool,
        affinity: Option<u64>,
    ) {
        // Shutdown bypasses the dispatcher: its resources are being torn
        // down and the caller must hear about it regardless.
        if inline || matches!(outcome, Err(RpcFailure::CommunicatorShutdown)) {
            run_shielded("completion", move || cb(outcome));
        } else {
            self.services.dispatcher.post(
                Box::new(move || run_shielded("completion", move || cb(outcome))),
                affinity,
            );
        }
    }

    // --- deadline -------------------------------------------------------

    /// Arms (or re-arms, on retry) the invocation deadline, remembering
    /// the handler so the deadline task can cancel this specific pending
    /// request.
    fn arm_deadline(self: &Arc<Self>, handler: &Arc<dyn RequestHandler>) {
        let timeout = self.provider.invocation_timeout_millis();
        if timeout == crate::constants::INVOCATION_TIMEOUT_DISABLED {
            return;
        }

        let stale = {
            let mut inner = self.state.lock();
            if inner.has(STATE_DONE) {
                return;
            }
            let stale = inner.timer.take();
            inner.timeout_handler = Some(Arc::clone(handler));
            stale
        };
        if let Some(t) = stale {
            t.revoke();
        }

        let weak = Arc::downgrade(self);
        let registration = self.services.timer.schedule(
            timeout,
            Box::new(move || {
                if let Some(invocation) = weak.upgrade() {
                    invocation.on_deadline();
                }
            }),
        );

        // The invocation may have completed while we were scheduling; in
        // that case the fresh registration is revoked immediately.
        let revoke = {
            let mut inner = self.state.lock();
            if inner.has(STATE_DONE) {
                inner.timeout_handler = None;
                Some(registration)
            } else {
                inner.timer = Some(registration);
                None
            }
        };
        if let Some(t) = revoke {
            t.revoke();
        }
    }

    fn on_deadline(self: &Arc<Self>) {
        let handler = {
            let mut inner = self.state.lock();
            if inner.has(STATE_DONE) {
                return;
            }
            inner.timer = None;
            inner.timeout_handler.take()
        };
        if let Some(h) = handler {
            h.cancel_pending(self, RpcFailure::InvocationTimeout);
        }
    }

    // --- buffer reclaim -------------------------------------------------

    /// Returns the invocation's buffers to a reuse pool. Allowed only once
    /// the invocation is done and its callbacks have been taken; earlier
    /// reclaim would be a use-after-free hazard, so this returns false and
    /// does nothing instead.
    pub fn recycle_buffers(&self, pool: &BufferPool) -> bool {
        let (outgoing, incoming) = {
            let mut inner = self.state.lock();
            if !inner.has(STATE_DONE)
                || inner.has(STATE_BUFFERS_RECLAIMED)
                || inner.completion_cb.is_some()
            {
                return false;
            }
            inner.bits |= STATE_BUFFERS_RECLAIMED;
            (mem::take(&mut inner.outgoing), inner.incoming.take())
        };
        pool.recycle(outgoing);
        if let Some(buffer) = incoming {
            pool.recycle(buffer);
        }
        true
    }
}
