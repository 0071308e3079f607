mod invocation_call;
mod invocation_error;
mod invocation_mode;
mod invocation_state;

pub use invocation_call::{CallResult, CompletionCallback, Invocation, SentCallback};
pub use invocation_error::{CallbackMisuse, NotFoundKind, RpcFailure, UndeclaredKind};
pub use invocation_mode::CallMode;

pub(crate) use invocation_state::run_shielded;
