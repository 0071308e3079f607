use crate::batch::{FlushBarrier, FlushBarrierBuilder, FlushTicket};
use crate::invocation::{Invocation, RpcFailure};
use crate::transport::{HandlerProvider, InvocationServices, RequestHandler};
use std::sync::Arc;

/// Pins a flush invocation to one already-resolved handler. A flush never
/// re-resolves: requests queued on a dead connection have nowhere else to
/// go.
struct FixedHandler {
    handler: Arc<dyn RequestHandler>,
}

impl HandlerProvider for FixedHandler {
    fn request_handler(&self) -> Result<Arc<dyn RequestHandler>, RpcFailure> {
        Ok(Arc::clone(&self.handler))
    }

    fn clear_request_handler(&self, _stale: &Arc<dyn RequestHandler>) {}
}

/// Flushes the batch requests queued on a proxy's current handler as one
/// message. The returned invocation completes when the flush has been
/// written (it never expects a reply); callers can block on it or register
/// callbacks like on any other invocation.
pub fn flush_proxy_batch(
    provider: Arc<dyn HandlerProvider>,
    services: InvocationServices,
) -> Arc<Invocation> {
    let flush = Invocation::new_flush(provider, services, None);
    let _ = flush.invoke(true);
    flush
}

/// Flushes the queued batch requests of every given handler, typically the
/// communicator's full connection set. Each handler gets its own flush
/// invocation; `on_complete` fires exactly once, after every per-handler
/// flush has finished (successfully or not), with whether all of them
/// completed synchronously.
///
/// Individual flush failures do not fail the aggregate: a connection whose
/// flush fails simply loses its queued requests, like any oneway traffic
/// on a dead connection.
pub fn flush_all<I, F>(
    handlers: I,
    services: InvocationServices,
    on_complete: F,
) -> Arc<FlushBarrier>
where
    I: IntoIterator<Item = Arc<dyn RequestHandler>>,
    F: FnOnce(bool) + Send + 'static,
{
    let builder = FlushBarrierBuilder::new(on_complete);
    for handler in handlers {
        let ticket = builder.register();
        flush_handler(handler, services.clone(), ticket);
    }
    builder.ready()
}

fn flush_handler(
    handler: Arc<dyn RequestHandler>,
    services: InvocationServices,
    ticket: FlushTicket,
) {
    let provider: Arc<dyn HandlerProvider> = Arc::new(FixedHandler { handler });
    let flush = Invocation::new_flush(provider, services, Some(ticket));
    let _ = flush.invoke(true);
}
