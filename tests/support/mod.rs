#![allow(dead_code)]

use outbound::batch::BatchQueue;
use outbound::invocation::{CallMode, Invocation, RpcFailure};
use outbound::proto::{Context, Identity, ReplyStatus, RequestEnvelope, WireWriter};
use outbound::transport::{
    CallbackDispatcher, DeadlineTimer, HandlerProvider, InvocationServices, RequestHandler,
    RetryDecision, RetryPolicy, RetryQueue, SendError, SendOutcome, TimerRegistration,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// --- dispatchers --------------------------------------------------------

/// Runs posted tasks immediately on the posting thread, counting them so
/// tests can assert which delivery path a callback took.
pub struct CountingDispatcher {
    pub posted: AtomicUsize,
}

impl CountingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            posted: AtomicUsize::new(0),
        })
    }

    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }
}

impl CallbackDispatcher for CountingDispatcher {
    fn post(&self, task: Box<dyn FnOnce() + Send>, _affinity: Option<u64>) {
        self.posted.fetch_add(1, Ordering::SeqCst);
        task();
    }
}

// --- timer --------------------------------------------------------------

struct ThreadTimerRegistration {
    revoked: Arc<AtomicBool>,
}

impl TimerRegistration for ThreadTimerRegistration {
    fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }
}

/// One thread per scheduled deadline; good enough for tests.
pub struct ThreadTimer;

impl DeadlineTimer for ThreadTimer {
    fn schedule(
        &self,
        delay_millis: u64,
        task: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn TimerRegistration> {
        let revoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&revoked);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_millis));
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });
        Box::new(ThreadTimerRegistration { revoked })
    }
}

// --- retry queue and policies -------------------------------------------

/// Records enqueued invocations instead of running a timer; tests drain it
/// explicitly to simulate the delay elapsing.
pub struct RecordingRetryQueue {
    entries: Mutex<Vec<(Arc<Invocation>, u64)>>,
}

impl RecordingRetryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    pub fn delays(&self) -> Vec<u64> {
        self.entries.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub fn drain_and_retry(&self) {
        let drained: Vec<_> = self.entries.lock().unwrap().drain(..).collect();
        for (invocation, _) in drained {
            invocation.retry();
        }
    }
}

impl RetryQueue for RecordingRetryQueue {
    fn enqueue(&self, invocation: Arc<Invocation>, delay_millis: u64) {
        self.entries.lock().unwrap().push((invocation, delay_millis));
    }
}

/// Gives up on the first consultation.
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn decide(
        &self,
        failure: &RpcFailure,
        _mode: CallMode,
        _any_bytes_sent: bool,
        _attempts: u32,
    ) -> RetryDecision {
        RetryDecision::GiveUp(failure.clone())
    }
}

/// Plays back a fixed sequence of decisions, then gives up.
pub struct ScriptedRetryPolicy {
    decisions: Mutex<VecDeque<RetryDecision>>,
}

impl ScriptedRetryPolicy {
    pub fn new(decisions: Vec<RetryDecision>) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into()),
        })
    }
}

impl RetryPolicy for ScriptedRetryPolicy {
    fn decide(
        &self,
        failure: &RpcFailure,
        _mode: CallMode,
        _any_bytes_sent: bool,
        _attempts: u32,
    ) -> RetryDecision {
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RetryDecision::GiveUp(failure.clone()))
    }
}

// --- transport mock -----------------------------------------------------

/// One scripted transport interaction.
pub enum SendScript {
    /// Fully written before the call returns.
    Sent,
    /// Queued; the test later fires `on_sent` / `on_reply` itself.
    Queued,
    Stale,
    Retryable(&'static str),
    Terminal(&'static str),
}

/// Scripted transport handle. Each `send`/`send_batch` call pops the next
/// entry; an exhausted script sends successfully.
pub struct MockHandler {
    pub id: u64,
    script: Mutex<VecDeque<SendScript>>,
    pub sends: AtomicUsize,
    pub batch_flushes: AtomicUsize,
    pub cancels: Mutex<Vec<RpcFailure>>,
    pub batch: BatchQueue,
    /// Flush invocations seen by `send_batch`, so tests can drive queued
    /// flushes to completion.
    pub flushes_seen: Mutex<Vec<Arc<Invocation>>>,
    append_stale_once: AtomicBool,
}

impl MockHandler {
    pub fn new(id: u64, script: Vec<SendScript>) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(script.into()),
            sends: AtomicUsize::new(0),
            batch_flushes: AtomicUsize::new(0),
            cancels: Mutex::new(Vec::new()),
            batch: BatchQueue::new(),
            flushes_seen: Mutex::new(Vec::new()),
            append_stale_once: AtomicBool::new(false),
        })
    }

    /// Makes the next `begin_batch_append` report a stale handle.
    pub fn fail_next_append_as_stale(&self) {
        self.append_stale_once.store(true, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn cancel_reasons(&self) -> Vec<RpcFailure> {
        self.cancels.lock().unwrap().clone()
    }

    fn next_outcome(&self) -> Result<SendOutcome, SendError> {
        match self.script.lock().unwrap().pop_front() {
            None | Some(SendScript::Sent) => Ok(SendOutcome { sent: true }),
            Some(SendScript::Queued) => Ok(SendOutcome { sent: false }),
            Some(SendScript::Stale) => Err(SendError::Stale),
            Some(SendScript::Retryable(reason)) => Err(SendError::retryable(reason)),
            Some(SendScript::Terminal(reason)) => Err(SendError::terminal(reason)),
        }
    }
}

impl RequestHandler for MockHandler {
    fn connection_id(&self) -> u64 {
        self.id
    }

    fn send(
        &self,
        invocation: &Arc<Invocation>,
        _compress: bool,
        _expects_reply: bool,
    ) -> Result<SendOutcome, SendError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        invocation.with_marshaled_request(|bytes| assert!(!bytes.is_empty()));
        self.next_outcome()
    }

    fn send_batch(&self, flush: &Arc<Invocation>) -> Result<SendOutcome, SendError> {
        self.batch_flushes.fetch_add(1, Ordering::SeqCst);
        self.flushes_seen.lock().unwrap().push(Arc::clone(flush));
        let outcome = self.next_outcome();
        if outcome.is_ok() {
            self.batch.take_for_flush();
        }
        outcome
    }

    fn cancel_pending(&self, invocation: &Arc<Invocation>, reason: RpcFailure) {
        self.cancels.lock().unwrap().push(reason.clone());
        invocation.on_canceled(reason);
    }

    fn begin_batch_append(&self) -> Result<(), SendError> {
        if self.append_stale_once.swap(false, Ordering::SeqCst) {
            return Err(SendError::Stale);
        }
        self.batch.begin_append();
        Ok(())
    }

    fn commit_batch_append(&self, encoded: &[u8]) -> Result<(), SendError> {
        self.batch.commit_append(encoded);
        Ok(())
    }

    fn abort_batch_append(&self) {
        self.batch.abort_append();
    }
}

/// Hands out handlers from a queue; clearing a stale handle pops the
/// front, so a retry sees the next one.
pub struct MockProvider {
    handlers: Mutex<VecDeque<Arc<MockHandler>>>,
    pub cleared: AtomicUsize,
    pub timeout_millis: u64,
}

impl MockProvider {
    pub fn new(handlers: Vec<Arc<MockHandler>>) -> Arc<Self> {
        Self::with_timeout(handlers, 0)
    }

    pub fn with_timeout(handlers: Vec<Arc<MockHandler>>, timeout_millis: u64) -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(handlers.into()),
            cleared: AtomicUsize::new(0),
            timeout_millis,
        })
    }

    pub fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl HandlerProvider for MockProvider {
    fn request_handler(&self) -> Result<Arc<dyn RequestHandler>, RpcFailure> {
        self.handlers
            .lock()
            .unwrap()
            .front()
            .cloned()
            .map(|h| h as Arc<dyn RequestHandler>)
            .ok_or_else(|| RpcFailure::TerminalTransport {
                reason: "no connection available".to_string(),
            })
    }

    fn clear_request_handler(&self, _stale: &Arc<dyn RequestHandler>) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().pop_front();
    }

    fn invocation_timeout_millis(&self) -> u64 {
        self.timeout_millis
    }
}

// --- assembly helpers ---------------------------------------------------

pub struct TestServices {
    pub services: InvocationServices,
    pub dispatcher: Arc<CountingDispatcher>,
    pub retry_queue: Arc<RecordingRetryQueue>,
}

pub fn services_with_policy(policy: Arc<dyn RetryPolicy>) -> TestServices {
    let dispatcher = CountingDispatcher::new();
    let retry_queue = RecordingRetryQueue::new();
    TestServices {
        services: InvocationServices {
            dispatcher: Arc::clone(&dispatcher) as Arc<dyn CallbackDispatcher>,
            timer: Arc::new(ThreadTimer),
            retry_queue: Arc::clone(&retry_queue) as Arc<dyn RetryQueue>,
            retry_policy: policy,
            observers: None,
        },
        dispatcher,
        retry_queue,
    }
}

pub fn test_services() -> TestServices {
    services_with_policy(Arc::new(NoRetryPolicy))
}

pub fn envelope(operation: &str, mode: CallMode) -> RequestEnvelope {
    RequestEnvelope {
        identity: Identity::named("target"),
        facet: String::new(),
        operation: operation.to_string(),
        mode,
        context: Context::new(),
    }
}

// --- reply fabrication --------------------------------------------------

pub fn ok_reply(body: &[u8]) -> Vec<u8> {
    let mut buf = vec![ReplyStatus::Ok.value()];
    buf.extend_from_slice(body);
    buf
}

pub fn user_exception_reply(body: &[u8]) -> Vec<u8> {
    let mut buf = vec![ReplyStatus::UserException.value()];
    buf.extend_from_slice(body);
    buf
}

pub fn not_exist_reply(status: ReplyStatus, identity: &Identity, facet: &str, operation: &str) -> Vec<u8> {
    let mut buf = vec![status.value()];
    let mut w = WireWriter::new(&mut buf);
    identity.write(&mut w);
    if facet.is_empty() {
        w.write_string_seq::<&str>(&[]);
    } else {
        w.write_string_seq(&[facet]);
    }
    w.write_string(operation);
    buf
}

pub fn unknown_reply(status: ReplyStatus, message: &str) -> Vec<u8> {
    let mut buf = vec![status.value()];
    WireWriter::new(&mut buf).write_string(message);
    buf
}
