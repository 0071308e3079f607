use crate::invocation::CallMode;

/// Metrics observer attached to one invocation. All hooks default to
/// no-ops so implementations only override what they record.
pub trait InvocationObserver: Send {
    fn attach(&self) {}

    fn detach(&self) {}

    /// Terminal failure, by stable category name (`RpcFailure::kind`).
    fn failed(&self, _kind: &str) {}

    /// The invocation is being retried.
    fn retried(&self) {}

    /// The reply carried a user exception (still a successful terminal
    /// outcome at the protocol level).
    fn user_exception(&self) {}

    /// A reply envelope of `size_bytes` arrived.
    fn reply(&self, _size_bytes: usize) {}
}

/// Creates observers for outgoing calls; `None` disables observation for
/// that call.
pub trait ObserverFactory: Send + Sync {
    fn for_remote_call(
        &self,
        operation: &str,
        mode: CallMode,
    ) -> Option<Box<dyn InvocationObserver>>;
}
