//! Reuse pool for per-connection buffer allocations (spec.md §5
//! "Resource lifetimes").
//!
//! Tearing down a connection just to allocate an identically-sized
//! `InputBuffer` for the next accept is wasted work under sustained
//! load; this pool hands back a previously-used buffer instead,
//! capped at `max_idle_connections` entries so a burst of short-lived
//! connections can't leave the pool growing unbounded.

use std::sync::Mutex;

use crate::buffer::InputBuffer;

pub struct BufferPool {
    capacity: usize,
    buffer_size: usize,
    free: Mutex<Vec<InputBuffer>>,
}

impl BufferPool {
    pub fn new(capacity: usize, buffer_size: usize) -> BufferPool {
        BufferPool { capacity, buffer_size, free: Mutex::new(Vec::new()) }
    }

    /// Takes a buffer from the pool, allocating a fresh one if empty.
    pub fn acquire(&self) -> InputBuffer {
        self.free.lock().unwrap().pop().unwrap_or_else(|| InputBuffer::new(self.buffer_size))
    }

    /// Returns a buffer for reuse once its connection closes. Dropped
    /// silently once the pool is at capacity.
    pub fn release(&self, mut buf: InputBuffer) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.capacity {
            buf.clear();
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffer() {
        let pool = BufferPool::new(2, 1024);
        let buf = pool.acquire();
        pool.release(buf);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
        let _ = pool.acquire();
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn drops_past_capacity() {
        let pool = BufferPool::new(1, 1024);
        pool.release(InputBuffer::new(1024));
        pool.release(InputBuffer::new(1024));
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
