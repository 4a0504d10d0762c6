use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

use super::rule::CHUNK_SIZE;

/// Upper bound on buffers kept around after a burst of concurrent copies.
pub const DEFAULT_MAX_IDLE_BUFFERS: usize = 1024;

/// Free-list of fixed `CHUNK_SIZE` buffers reused across copy operations.
///
/// Buffers are handed out as [`PooledBuffer`] guards and go back to the list on drop.
/// When the list is full the returned buffer is simply freed.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Box<[u8]>>>,
    max_idle: usize,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_idle }
    }

    pub fn get(&self) -> PooledBuffer<'_> {
        let buf = self.free.lock().pop().unwrap_or_else(|| vec![0u8; CHUNK_SIZE].into_boxed_slice());
        PooledBuffer { buf, pool: self }
    }

    /// Buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn put(&self, buf: Box<[u8]>) {
        if buf.len() != CHUNK_SIZE {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_BUFFERS)
    }
}

pub struct PooledBuffer<'a> {
    buf: Box<[u8]>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}
