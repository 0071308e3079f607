use crate::constants::DEFAULT_BUFFER_POOL_CAPACITY;
use std::sync::Mutex;

/// Reuse pool for message buffers, to reduce allocation churn on hot call
/// paths.
///
/// An invocation releases its buffers into the pool only after it is done
/// and its callbacks have run; see `Invocation::recycle_buffers`.
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Takes a cleared buffer out of the pool, or allocates a fresh one.
    pub fn acquire(&self) -> Vec<u8> {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        buffers.pop().unwrap_or_default()
    }

    /// Returns a buffer to the pool. The buffer is cleared but keeps its
    /// allocation. Buffers beyond the pool capacity are dropped.
    pub fn recycle(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        if buffers.len() < self.capacity {
            buffers.push(buffer);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
