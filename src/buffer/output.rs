//! Fixed-capacity output buffer and the per-connection outgoing queue
//! (spec.md §3 "Output buffer", §4.6).

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Append-only until flipped for writing, then drained byte-for-byte.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: Vec<u8>,
    written: usize,
}

impl OutputBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        OutputBuffer {
            buf: Vec::with_capacity(capacity),
            written: 0,
        }
    }

    pub fn remaining_capacity(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.buf.len())
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn is_drained(&self) -> bool {
        self.written >= self.buf.len()
    }

    /// Writes as many bytes as the channel accepts; returns the number
    /// written this call.
    pub fn write_to<W: Write>(&mut self, channel: &mut W) -> io::Result<usize> {
        let mut total = 0;
        while !self.is_drained() {
            match channel.write(&self.buf[self.written..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.written += n;
                    total += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

/// Thread-safe FIFO of output buffers awaiting a channel write.
///
/// This is the sole thread-safe mutator of a connection's outgoing
/// queue (spec.md §5): handler threads call `enqueue`, the reactor
/// thread calls `drain_into`.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    inner: Arc<Mutex<QueueState>>,
}

#[derive(Debug)]
struct QueueState {
    buffers: VecDeque<OutputBuffer>,
    closed: bool,
}

impl OutputQueue {
    pub fn new() -> Self {
        OutputQueue {
            inner: Arc::new(Mutex::new(QueueState {
                buffers: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Appends a buffer; a no-op if the connection is closed, per
    /// spec.md §4.6.
    pub fn enqueue(&self, buf: OutputBuffer) {
        let mut state = self.inner.lock().unwrap();
        if !state.closed {
            state.buffers.push_back(buf);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().buffers.is_empty()
    }

    /// Rejects further enqueues but lets queued bytes keep draining,
    /// per spec.md §3 "after close() ... queued bytes must still flush".
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Drains as much of the head-of-line buffer as the channel will
    /// accept. Returns `true` once the queue is fully empty.
    pub fn drain_into<W: Write>(&self, channel: &mut W) -> io::Result<bool> {
        loop {
            let mut state = self.inner.lock().unwrap();
            let front = match state.buffers.front_mut() {
                Some(f) => f,
                None => return Ok(true),
            };
            // Borrow-check dance: write without holding the lock across
            // a blocking syscall would be nicer, but mirrors the
            // teacher's single-threaded codec which always holds one
            // buffer head at a time; contention here is negligible
            // since only the reactor thread calls this method.
            let result = front.write_to(channel);
            let drained = front.is_drained();
            if drained {
                state.buffers.pop_front();
            }
            match result {
                Ok(_) if drained => {
                    if state.buffers.is_empty() {
                        return Ok(true);
                    }
                    continue;
                }
                Ok(_) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink(Vec<u8>);
    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fifo_drain_order() {
        let q = OutputQueue::new();
        let mut a = OutputBuffer::with_capacity(4);
        a.extend(b"AAAA");
        let mut b = OutputBuffer::with_capacity(4);
        b.extend(b"BBBB");
        q.enqueue(a);
        q.enqueue(b);

        let mut sink = Sink(Vec::new());
        let done = q.drain_into(&mut sink).unwrap();
        assert!(done);
        assert_eq!(sink.0, b"AAAABBBB");
    }

    #[test]
    fn closed_queue_rejects_new_but_drains_pending() {
        let q = OutputQueue::new();
        let mut a = OutputBuffer::with_capacity(4);
        a.extend(b"AAAA");
        q.enqueue(a);
        q.close();

        let mut rejected = OutputBuffer::with_capacity(4);
        rejected.extend(b"ZZZZ");
        q.enqueue(rejected);

        let mut sink = Sink(Vec::new());
        let done = q.drain_into(&mut sink).unwrap();
        assert!(done);
        assert_eq!(sink.0, b"AAAA");
    }
}
