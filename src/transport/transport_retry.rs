use crate::invocation::{CallMode, Invocation, RpcFailure};
use std::sync::Arc;

/// Outcome of consulting the retry policy for a retryable failure.
#[derive(Debug)]
pub enum RetryDecision {
    /// Retry on the current thread, immediately.
    Immediate,

    /// Hand the invocation to the delayed-retry queue and return to the
    /// caller; the queue re-invokes after the delay.
    AfterDelay(u64),

    /// Retry budget exhausted; finalize the invocation with this failure.
    GiveUp(RpcFailure),
}

/// Converts a failure into a retry decision. Owned by the proxy layer;
/// the invocation only consumes it.
pub trait RetryPolicy: Send + Sync {
    fn decide(
        &self,
        failure: &RpcFailure,
        mode: CallMode,
        any_bytes_sent: bool,
        attempts: u32,
    ) -> RetryDecision;
}

/// Delayed-retry queue. After `delay_millis` the queue calls
/// `Invocation::retry` from one of its own threads.
pub trait RetryQueue: Send + Sync {
    fn enqueue(&self, invocation: Arc<Invocation>, delay_millis: u64);
}
