use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

/// A simple counter which is initialized at 1. Request id 0 is reserved
/// for messages that do not expect a reply.
static REQUEST_ID_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

/// Returns a process-unique correlation id for an outgoing request.
#[inline]
pub fn generate_request_id() -> u32 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed) as u32
}
