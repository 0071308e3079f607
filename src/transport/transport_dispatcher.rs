/// Serialized callback dispatch, typically backed by the transport's
/// client thread pool.
///
/// Tasks posted with the same affinity key (a connection id) run in post
/// order, one at a time; this preserves the application-visible ordering
/// of sent/completion notifications per connection. Tasks with different
/// keys, or with no key, may run concurrently.
pub trait CallbackDispatcher: Send + Sync {
    fn post(&self, task: Box<dyn FnOnce() + Send>, affinity: Option<u64>);
}
