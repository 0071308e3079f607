mod buffer_pool;
mod generate_request_id;

pub use buffer_pool::BufferPool;
pub use generate_request_id::generate_request_id;
