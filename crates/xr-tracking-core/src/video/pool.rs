//! Process-wide pool of frame buffers bucketed by byte length

use crate::shared::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Buffers kept per size before extra releases are dropped
const MAX_BUFFERS_PER_SIZE: usize = 4;

#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared pool used by frames that were not given one explicitly
    pub fn global() -> Arc<BufferPool> {
        static POOL: OnceLock<Arc<BufferPool>> = OnceLock::new();
        POOL.get_or_init(|| Arc::new(BufferPool::new())).clone()
    }

    /// A buffer of exactly `len` bytes, recycled when one is available.
    /// Contents of a recycled buffer are stale.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        lock(&self.free)
            .get_mut(&len)
            .and_then(Vec::pop)
            .unwrap_or_else(|| vec![0; len])
    }

    pub fn release(&self, buffer: Vec<u8>) {
        if buffer.is_empty() {
            return;
        }
        let mut free = lock(&self.free);
        let bucket = free.entry(buffer.len()).or_default();
        if bucket.len() < MAX_BUFFERS_PER_SIZE {
            bucket.push(buffer);
        }
    }

    /// Number of idle buffers of `len` bytes
    pub fn available(&self, len: usize) -> usize {
        lock(&self.free).get(&len).map_or(0, Vec::len)
    }
}
