mod batch_barrier;
mod batch_flush;
mod batch_queue;

pub use batch_barrier::{FlushBarrier, FlushBarrierBuilder, FlushTicket};
pub use batch_flush::{flush_all, flush_proxy_batch};
pub use batch_queue::BatchQueue;
