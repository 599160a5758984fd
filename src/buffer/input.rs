//! Fixed-capacity input buffer with peek/read/mark/skip semantics
//! (spec.md §3 "Input buffer", §4.2).

use std::io::{self, Read};

/// A growable-but-capped byte area that bytes are read into from a
/// channel and then consumed in order by a connection's state machine.
///
/// Invariant: `0 <= read <= mark.unwrap_or(read) <= end <= capacity`.
#[derive(Debug)]
pub struct InputBuffer {
    buf: Vec<u8>,
    capacity: usize,
    read: usize,
    end: usize,
    mark: Option<usize>,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        InputBuffer {
            buf: vec![0; capacity],
            capacity,
            read: 0,
            end: 0,
            mark: None,
        }
    }

    /// Bytes currently unread.
    pub fn len(&self) -> usize {
        self.end - self.read
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available(&self, n: usize) -> bool {
        self.end - self.read >= n
    }

    pub fn peek_byte(&self, offset: usize) -> Option<u8> {
        let idx = self.read + offset;
        if idx < self.end {
            Some(self.buf[idx])
        } else {
            None
        }
    }

    pub fn read_byte(&mut self) -> io::Result<u8> {
        self.require(1)?;
        let b = self.buf[self.read];
        self.read += 1;
        Ok(b)
    }

    pub fn read_u16_be(&mut self) -> io::Result<u16> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.buf[self.read], self.buf[self.read + 1]]);
        self.read += 2;
        Ok(v)
    }

    pub fn read_u24_be(&mut self) -> io::Result<u32> {
        self.require(3)?;
        let b = &self.buf[self.read..self.read + 3];
        let v = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32);
        self.read += 3;
        Ok(v)
    }

    /// 31-bit unsigned value; the reserved top bit is masked off, as
    /// used for HTTP/2 stream identifiers (spec.md §3).
    pub fn read_u31_be(&mut self) -> io::Result<u32> {
        let v = self.read_u32_be_raw()?;
        Ok(v & 0x7fff_ffff)
    }

    pub fn read_i32_be(&mut self) -> io::Result<i32> {
        Ok(self.read_u32_be_raw()? as i32)
    }

    /// Returns the 32-bit value widened into a u64, matching the
    /// contract in spec.md §4.2.
    pub fn read_u32_be(&mut self) -> io::Result<u64> {
        Ok(self.read_u32_be_raw()? as u64)
    }

    fn read_u32_be_raw(&mut self) -> io::Result<u32> {
        self.require(4)?;
        let b = &self.buf[self.read..self.read + 4];
        let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        self.read += 4;
        Ok(v)
    }

    pub fn read_u64_be(&mut self) -> io::Result<u64> {
        self.require(8)?;
        let b = &self.buf[self.read..self.read + 8];
        let v = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        self.read += 8;
        Ok(v)
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> io::Result<()> {
        self.require(dst.len())?;
        dst.copy_from_slice(&self.buf[self.read..self.read + dst.len()]);
        self.read += dst.len();
        Ok(())
    }

    pub fn read_vec(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.require(n)?;
        let v = self.buf[self.read..self.read + n].to_vec();
        self.read += n;
        Ok(v)
    }

    pub fn read_string(&mut self, n: usize) -> io::Result<String> {
        let bytes = self.read_vec(n)?;
        String::from_utf8(bytes).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "not utf-8"))
    }

    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        self.require(n)?;
        self.read += n;
        Ok(())
    }

    /// Resets indices so the buffer can be handed to a new connection
    /// without reallocating its backing storage (spec.md §5 "Resource
    /// lifetimes").
    pub fn clear(&mut self) {
        self.read = 0;
        self.end = 0;
        self.mark = None;
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.read);
    }

    /// Resets the read cursor to the mark and returns the number of
    /// bytes that had been consumed since the mark was set.
    pub fn reset_to_mark(&mut self) -> usize {
        let mark = self.mark.take().unwrap_or(self.read);
        let diff = self.read - mark;
        self.read = mark;
        diff
    }

    pub fn num_marked_bytes(&self) -> usize {
        match self.mark {
            Some(mark) => self.read - mark,
            None => 0,
        }
    }

    /// Scans for a CRLF-terminated line without requiring the caller
    /// to know its length in advance (HTTP/1.1 request lines and
    /// header fields, spec.md §4.3). Returns `Ok(None)` when no CRLF
    /// is present yet within `max_len` bytes of lookahead (caller
    /// should wait for more input); `Err(())` once `max_len` is
    /// exceeded without finding one.
    pub fn read_line(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, ()> {
        let mut offset = 0;
        loop {
            if offset >= max_len {
                return Err(());
            }
            match self.peek_byte(offset) {
                None => return Ok(None),
                Some(b'\n') if offset > 0 && self.peek_byte(offset - 1) == Some(b'\r') => {
                    let line = self.buf[self.read..self.read + offset - 1].to_vec();
                    self.read += offset + 1;
                    return Ok(Some(line));
                }
                Some(_) => offset += 1,
            }
        }
    }

    pub fn prefix_match(&self, pattern: &[u8]) -> bool {
        if !self.available(pattern.len()) {
            return false;
        }
        &self.buf[self.read..self.read + pattern.len()] == pattern
    }

    /// Reads as much as the channel will yield without blocking.
    /// Returns `Ok(true)` if the buffer filled up (more may be pending
    /// in the kernel), `Ok(false)` otherwise.
    pub fn add_data<R: Read>(&mut self, channel: &mut R) -> io::Result<bool> {
        loop {
            if self.end == self.capacity {
                self.compact();
                if self.end == self.capacity {
                    // Buffer is genuinely full; caller must drain first.
                    return Ok(true);
                }
            }

            match channel.read(&mut self.buf[self.end..self.capacity]) {
                Ok(0) => return Ok(self.end == self.capacity),
                Ok(n) => {
                    self.end += n;
                    if self.end == self.capacity {
                        return Ok(true);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(self.end == self.capacity);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Copies the unread suffix of `other` into the start of `self`,
    /// used when handing the remainder of an HTTP/1.1 buffer to a new
    /// h2c connection (spec.md §4.3 "h2c upgrade").
    pub fn adopt(&mut self, other: &mut InputBuffer) {
        let remaining = other.len();
        self.buf[..remaining].copy_from_slice(&other.buf[other.read..other.end]);
        self.read = 0;
        self.end = remaining;
        self.mark = None;
        other.read = other.end;
    }

    fn require(&mut self, n: usize) -> io::Result<()> {
        if self.available(n) {
            return Ok(());
        }
        if self.end == self.capacity {
            self.compact();
        }
        if self.available(n) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"))
        }
    }

    /// Compacts the buffer, preserving bytes from the mark (if set) or
    /// from the read cursor otherwise, per spec.md §4.2.
    fn compact(&mut self) {
        let start = self.mark.unwrap_or(self.read);
        if start == 0 {
            return;
        }
        let len = self.end - start;
        self.buf.copy_within(start..self.end, 0);
        self.read -= start;
        self.end -= start;
        if let Some(m) = self.mark.as_mut() {
            *m -= start;
        }
        debug_assert_eq!(self.end, len + 0 /* silence unused in release */);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_advance() {
        let mut buf = InputBuffer::new(16);
        let mut src: &[u8] = b"hello";
        buf.add_data(&mut src).unwrap();
        assert_eq!(buf.peek_byte(0), Some(b'h'));
        assert_eq!(buf.peek_byte(0), Some(b'h'));
        assert_eq!(buf.read_byte().unwrap(), b'h');
    }

    #[test]
    fn mark_and_reset() {
        let mut buf = InputBuffer::new(16);
        let mut src: &[u8] = b"hello";
        buf.add_data(&mut src).unwrap();
        buf.mark();
        buf.read_byte().unwrap();
        buf.read_byte().unwrap();
        assert_eq!(buf.num_marked_bytes(), 2);
        let consumed = buf.reset_to_mark();
        assert_eq!(consumed, 2);
        assert_eq!(buf.read_byte().unwrap(), b'h');
    }

    #[test]
    fn prefix_match() {
        let mut buf = InputBuffer::new(32);
        let mut src: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
        buf.add_data(&mut src).unwrap();
        assert!(buf.prefix_match(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"));
        assert!(!buf.prefix_match(b"GET"));
    }

    #[test]
    fn compaction_preserves_mark() {
        let mut buf = InputBuffer::new(8);
        let mut src: &[u8] = b"abcdefgh";
        buf.add_data(&mut src).unwrap();
        buf.read_byte().unwrap();
        buf.read_byte().unwrap();
        buf.mark();
        buf.read_byte().unwrap();
        // Buffer is full; a further add_data should compact from mark.
        let mut more: &[u8] = b"";
        let _ = buf.add_data(&mut more);
        assert_eq!(buf.num_marked_bytes(), 1);
    }

    #[test]
    fn adopt_copies_unread_suffix() {
        let mut h1_buf = InputBuffer::new(32);
        let mut src: &[u8] = b"GET / HTTP/1.1\r\n\r\nPRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
        h1_buf.add_data(&mut src).unwrap();
        h1_buf.skip(16).unwrap();

        let mut h2_buf = InputBuffer::new(64);
        h2_buf.adopt(&mut h1_buf);
        assert!(h2_buf.prefix_match(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"));
        assert!(h1_buf.is_empty());
    }
}
