use crate::transport::{CallbackDispatcher, DeadlineTimer, ObserverFactory, RetryPolicy, RetryQueue};
use std::sync::Arc;

/// The communicator-level collaborators every invocation consumes.
/// Cloning is cheap; all members are shared.
#[derive(Clone)]
pub struct InvocationServices {
    pub dispatcher: Arc<dyn CallbackDispatcher>,
    pub timer: Arc<dyn DeadlineTimer>,
    pub retry_queue: Arc<dyn RetryQueue>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub observers: Option<Arc<dyn ObserverFactory>>,
}
