/// Owned handle to one scheduled deadline. Revoking is idempotent and
/// best-effort: a task that already started firing simply loses the race
/// against the invocation's monitor and becomes a no-op.
///
/// Revoke must not block waiting for a concurrently running task; the
/// invocation may call it while holding no locks but expects it to return
/// promptly.
pub trait TimerRegistration: Send {
    fn revoke(&self);
}

/// Deadline timer service. The scheduled task captures only a weak
/// reference to its invocation, so the timer never keeps a completed
/// invocation alive.
pub trait DeadlineTimer: Send + Sync {
    fn schedule(
        &self,
        delay_millis: u64,
        task: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn TimerRegistration>;
}
