mod transport_dispatcher;
mod transport_handler;
mod transport_observer;
mod transport_retry;
mod transport_services;
mod transport_timer;

pub use transport_dispatcher::CallbackDispatcher;
pub use transport_handler::{HandlerProvider, RequestHandler, SendError, SendOutcome};
pub use transport_observer::{InvocationObserver, ObserverFactory};
pub use transport_retry::{RetryDecision, RetryPolicy, RetryQueue};
pub use transport_services::InvocationServices;
pub use transport_timer::{DeadlineTimer, TimerRegistration};
