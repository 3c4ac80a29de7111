//! Fixed-capacity circular byte arena.
//!
//! One slot is kept empty to tell "full" from "empty", so a ring of `size`
//! bytes holds at most `size - 1`.

/// Circular byte store with a read cursor (`head`) and a write cursor (`tail`).
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl RingBuffer {
    /// Allocate a ring of `size` bytes. Sizes below 2 are raised to 2.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(2)].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Physical size of the arena.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Maximum number of bytes the ring can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    /// Bytes written and not yet consumed.
    pub fn available(&self) -> usize {
        (self.tail + self.buf.len() - self.head) % self.buf.len()
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Append as much of `data` as fits; returns the number of bytes written.
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free_space());
        let size = self.buf.len();
        let first = n.min(size - self.tail);
        self.buf[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.tail = (self.tail + n) % size;
        n
    }

    /// Byte at `offset` past the read cursor. Callers keep `offset < available()`.
    pub fn peek_at(&self, offset: usize) -> u8 {
        self.buf[(self.head + offset) % self.buf.len()]
    }

    /// Copy `out.len()` bytes starting `offset` past the read cursor, without
    /// consuming them. Returns `false` if that many bytes are not available.
    pub fn copy_out(&self, offset: usize, out: &mut [u8]) -> bool {
        if offset + out.len() > self.available() {
            return false;
        }
        let size = self.buf.len();
        let start = (self.head + offset) % size;
        let first = out.len().min(size - start);
        out[..first].copy_from_slice(&self.buf[start..start + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.buf[..rest]);
        true
    }

    /// Consume `n` bytes (clamped to what is available).
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.available());
        self.head = (self.head + n) % self.buf.len();
    }

    /// Un-consume `n` bytes just read. Only valid directly after an `advance`
    /// of at least `n` with no intervening write over those bytes.
    pub fn rewind(&mut self, n: usize) {
        let n = n.min(self.free_space());
        let size = self.buf.len();
        self.head = (self.head + size - n % size) % size;
    }

    /// Drop all contents.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}
