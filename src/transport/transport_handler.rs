use crate::invocation::{Invocation, RpcFailure};
use std::sync::Arc;

/// Result of a successful handoff to the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// True when the request was fully written before the call returned.
    /// False means the transport queued it and will notify the invocation
    /// through `Invocation::on_sent` later.
    pub sent: bool,
}

/// Failure of a handoff attempt.
#[derive(Debug)]
pub enum SendError {
    /// The handle went stale (e.g. its connection closed between handle
    /// acquisition and send). The invocation drops the handle, asks the
    /// proxy for a fresh one and retries without counting the attempt.
    Stale,

    /// Counted failure, subject to the retry policy.
    Retryable(RpcFailure),

    /// No retry; the failure finalizes the invocation.
    Terminal(RpcFailure),
}

impl SendError {
    pub fn retryable(reason: &str) -> Self {
        SendError::Retryable(RpcFailure::RetryableTransport {
            reason: reason.to_string(),
        })
    }

    pub fn terminal(reason: &str) -> Self {
        SendError::Terminal(RpcFailure::TerminalTransport {
            reason: reason.to_string(),
        })
    }
}

/// Capability binding an invocation to a specific connection or collocated
/// path at a point in time. Not owned by the invocation; it can go stale.
///
/// Implementations call back into the invocation's transport-facing entry
/// points (`on_sent`, `on_reply`, `on_failure`, `on_canceled`) from their
/// own dispatch threads.
pub trait RequestHandler: Send + Sync {
    /// Stable id of the underlying connection, used as the affinity key
    /// for serialized callback dispatch.
    fn connection_id(&self) -> u64;

    /// Hands a marshaled request to the transport.
    fn send(
        &self,
        invocation: &Arc<Invocation>,
        compress: bool,
        expects_reply: bool,
    ) -> Result<SendOutcome, SendError>;

    /// Flushes this handler's queued batch requests as one message.
    fn send_batch(&self, flush: &Arc<Invocation>) -> Result<SendOutcome, SendError>;

    /// Same-process shortcut delivery, bypassing the wire envelope where
    /// safe. `Ok(true)` means the dispatcher accepted the invocation and
    /// will drive its completion; `Ok(false)` means there is no collocated
    /// path and the caller should send normally.
    fn offer_collocated(&self, _invocation: &Arc<Invocation>) -> Result<bool, SendError> {
        Ok(false)
    }

    /// Cancels a pending request, e.g. on invocation timeout or shutdown.
    /// Must be safe to call when the request already completed (no-op).
    /// When the request is still pending the handler reports back through
    /// `Invocation::on_canceled(reason)`.
    fn cancel_pending(&self, invocation: &Arc<Invocation>, reason: RpcFailure);

    /// Claims the handler's shared batch buffer for one append. Paired
    /// with exactly one `commit_batch_append` or `abort_batch_append`.
    fn begin_batch_append(&self) -> Result<(), SendError>;

    fn commit_batch_append(&self, encoded: &[u8]) -> Result<(), SendError>;

    fn abort_batch_append(&self);
}

/// The proxy seam: resolves a transport handle for the next attempt and
/// carries proxy-level invocation configuration.
pub trait HandlerProvider: Send + Sync {
    fn request_handler(&self) -> Result<Arc<dyn RequestHandler>, RpcFailure>;

    /// Drops a stale handle so the next `request_handler` call resolves a
    /// fresh one.
    fn clear_request_handler(&self, stale: &Arc<dyn RequestHandler>);

    /// Invocation deadline in milliseconds; 0 disables the deadline.
    fn invocation_timeout_millis(&self) -> u64 {
        crate::constants::INVOCATION_TIMEOUT_DISABLED
    }

    /// Whether requests through this proxy ask for compression.
    fn compress(&self) -> bool {
        false
    }
}
