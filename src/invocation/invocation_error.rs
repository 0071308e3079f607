use crate::proto::{Identity, WireError};
use std::fmt;

/// Which part of the target descriptor the server failed to resolve.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NotFoundKind {
    Object,
    Facet,
    Operation,
}

/// Which unknown-* reply status carried the diagnostic.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UndeclaredKind {
    Unknown,
    Local,
    User,
}

/// Misuse of the invocation API by the calling application. Terminal to
/// the call that made the mistake, never to the transport.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CallbackMisuse {
    /// The callback slot in question is already occupied.
    AlreadyRegistered,
    /// `blocking_wait` was called a second time on the same invocation.
    WaitAlreadyConsumed,
}

impl fmt::Display for CallbackMisuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackMisuse::AlreadyRegistered => write!(f, "callback already registered"),
            CallbackMisuse::WaitAlreadyConsumed => {
                write!(f, "blocking wait already consumed for this invocation")
            }
        }
    }
}

impl std::error::Error for CallbackMisuse {}

/// Failure taxonomy of the invocation engine.
///
/// Retryable failures are resolved locally by the retry loop and only
/// surface when the retry policy gives up; everything else is terminal and
/// is funneled to exactly one of the registered completion callback or a
/// `blocking_wait` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// Transport-level failure that is counted against the retry budget
    /// and subject to the retry policy.
    RetryableTransport { reason: String },

    /// Transport or marshaling failure with no retry semantics (e.g.
    /// marshaling corruption).
    TerminalTransport { reason: String },

    /// The server could not resolve the target object, facet or operation.
    TargetNotFound {
        kind: NotFoundKind,
        identity: Identity,
        facet: String,
        operation: String,
    },

    /// The remote side threw a failure it never declared; carries the
    /// server's diagnostic string.
    RemoteUndeclared {
        kind: UndeclaredKind,
        message: String,
    },

    /// Unrecognized reply status byte. Always a bug signal, never retried.
    ProtocolViolation { status: u8 },

    /// The invocation deadline fired before a reply arrived.
    InvocationTimeout,

    /// The communicator is being torn down. Propagates directly, bypassing
    /// the callback dispatcher.
    CommunicatorShutdown,

    /// Programming error on the caller's side; see [`CallbackMisuse`].
    CallbackMisuse(CallbackMisuse),
}

impl RpcFailure {
    /// Only retryable transport failures are eligible for the retry
    /// policy; a stale handle is signaled separately (`SendError::Stale`)
    /// and is not counted against the budget.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcFailure::RetryableTransport { .. })
    }

    /// Stable category name, used when detaching metrics observers.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcFailure::RetryableTransport { .. } => "RetryableTransport",
            RpcFailure::TerminalTransport { .. } => "TerminalTransport",
            RpcFailure::TargetNotFound { kind, .. } => match kind {
                NotFoundKind::Object => "ObjectNotExist",
                NotFoundKind::Facet => "FacetNotExist",
                NotFoundKind::Operation => "OperationNotExist",
            },
            RpcFailure::RemoteUndeclared { kind, .. } => match kind {
                UndeclaredKind::Unknown => "UnknownException",
                UndeclaredKind::Local => "UnknownLocalException",
                UndeclaredKind::User => "UnknownUserException",
            },
            RpcFailure::ProtocolViolation { .. } => "ProtocolViolation",
            RpcFailure::InvocationTimeout => "InvocationTimeout",
            RpcFailure::CommunicatorShutdown => "CommunicatorShutdown",
            RpcFailure::CallbackMisuse(_) => "CallbackMisuse",
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::RetryableTransport { reason } => {
                write!(f, "retryable transport failure: {}", reason)
            }
            RpcFailure::TerminalTransport { reason } => {
                write!(f, "terminal transport failure: {}", reason)
            }
            RpcFailure::TargetNotFound {
                kind,
                identity,
                facet,
                operation,
            } => write!(
                f,
                "{:?} not found: identity={}, facet={:?}, operation={:?}",
                kind, identity, facet, operation
            ),
            RpcFailure::RemoteUndeclared { kind, message } => {
                write!(f, "remote threw an undeclared failure ({:?}): {}", kind, message)
            }
            RpcFailure::ProtocolViolation { status } => {
                write!(f, "unrecognized reply status {}", status)
            }
            RpcFailure::InvocationTimeout => write!(f, "invocation timed out"),
            RpcFailure::CommunicatorShutdown => write!(f, "communicator shut down"),
            RpcFailure::CallbackMisuse(m) => write!(f, "callback misuse: {}", m),
        }
    }
}

impl std::error::Error for RpcFailure {}

impl From<WireError> for RpcFailure {
    fn from(e: WireError) -> Self {
        RpcFailure::TerminalTransport {
            reason: format!("reply unmarshaling failed: {}", e),
        }
    }
}

impl From<CallbackMisuse> for RpcFailure {
    fn from(m: CallbackMisuse) -> Self {
        RpcFailure::CallbackMisuse(m)
    }
}
