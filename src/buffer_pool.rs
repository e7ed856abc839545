//! Fixed-capacity recycler of I/O scratch buffers
//!
//! A best-effort reuse cache, not a resource limiter: [`acquire`](BufferPool::acquire)
//! never blocks and allocates when the pool is empty, and
//! [`release`](BufferPool::release) drops the buffer when the pool is full.
//! Download concurrency is already bounded by the worker pools, so the number
//! of live buffers is bounded too.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Shared pool of equally sized byte buffers
#[derive(Debug)]
pub struct BufferPool {
    /// Free list; never longer than `capacity`
    slots: Mutex<Vec<Box<[u8]>>>,
    capacity: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Create an empty pool retaining at most `capacity` buffers of `buffer_size` bytes
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            buffer_size,
        }
    }

    /// Take a released buffer, or allocate a fresh one if none is free
    pub fn acquire(&self) -> Box<[u8]> {
        let recycled = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        recycled.unwrap_or_else(|| vec![0u8; self.buffer_size].into_boxed_slice())
    }

    /// Return a buffer for reuse; dropped if the pool is full or the size differs
    pub fn release(&self, buffer: Box<[u8]>) {
        if buffer.len() != self.buffer_size {
            return;
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() < self.capacity {
            slots.push(buffer);
        }
    }

    /// Acquire a buffer that is released automatically when the guard drops
    pub fn lease(&self) -> PooledBuffer<'_> {
        PooledBuffer {
            pool: self,
            buffer: Some(self.acquire()),
        }
    }

    /// Number of buffers currently held for reuse
    pub fn available(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Maximum number of buffers retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of every buffer handed out
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

/// Buffer borrowed from a [`BufferPool`], returned on drop
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: Option<Box<[u8]>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}
