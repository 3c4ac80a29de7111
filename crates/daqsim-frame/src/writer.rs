use tracing::trace;

use crate::error::{FrameError, Result};
use crate::ring::RingBuffer;

/// Default TX ring size in bytes.
pub const DEFAULT_TX_CAPACITY: usize = 65535;

/// Size of the per-record length prefix.
pub const RECORD_PREFIX: usize = 2;

/// Transmit-side queue of whole frames.
///
/// Each record is stored as a 2-byte little-endian length followed by the
/// frame bytes. Enqueue and dequeue are record-atomic: a record is either
/// fully queued or not at all, and is only handed out complete.
#[derive(Debug)]
pub struct TxQueue {
    ring: RingBuffer,
    records: usize,
}

impl TxQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            records: 0,
        }
    }

    /// Queue one encoded frame.
    ///
    /// Fails with [`FrameError::QueueFull`] when the record and its prefix do
    /// not fit; the queue is left untouched.
    pub fn enqueue(&mut self, frame: &[u8]) -> Result<()> {
        let len = u16::try_from(frame.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: frame.len(),
            max: u16::MAX as usize,
        })?;
        let needed = frame.len() + RECORD_PREFIX;
        let free = self.ring.free_space();
        if needed > free {
            return Err(FrameError::QueueFull { needed, free });
        }
        self.ring.push_slice(&len.to_le_bytes());
        self.ring.push_slice(frame);
        self.records += 1;
        trace!(len = frame.len(), records = self.records, "tx enqueue");
        Ok(())
    }

    /// Take the oldest record into `out`.
    ///
    /// Returns `Ok(None)` when no complete record is queued. A record larger
    /// than `out` is consumed and reported as [`FrameError::RecordTooLarge`].
    pub fn dequeue(&mut self, out: &mut [u8]) -> Result<Option<usize>> {
        if self.ring.available() < RECORD_PREFIX {
            return Ok(None);
        }
        let len = u16::from_le_bytes([self.ring.peek_at(0), self.ring.peek_at(1)]) as usize;
        self.ring.advance(RECORD_PREFIX);

        if self.ring.available() < len {
            self.ring.rewind(RECORD_PREFIX);
            return Ok(None);
        }

        self.records = self.records.saturating_sub(1);
        if len > out.len() {
            self.ring.advance(len);
            return Err(FrameError::RecordTooLarge {
                size: len,
                capacity: out.len(),
            });
        }

        self.ring.copy_out(0, &mut out[..len]);
        self.ring.advance(len);
        Ok(Some(len))
    }

    /// Number of complete records queued.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Bytes in use, prefixes included.
    pub fn used(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn reset(&mut self) {
        self.ring.reset();
        self.records = 0;
    }
}

impl Default for TxQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_preserves_record_boundaries() {
        let mut queue = TxQueue::new();
        let records: Vec<Vec<u8>> = [10usize, 37, 256]
            .iter()
            .enumerate()
            .map(|(i, &len)| vec![i as u8 + 1; len])
            .collect();
        for record in &records {
            queue.enqueue(record).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.used(), 10 + 37 + 256 + 3 * RECORD_PREFIX);

        let mut out = [0u8; 512];
        for record in &records {
            let n = queue.dequeue(&mut out).unwrap().unwrap();
            assert_eq!(&out[..n], record.as_slice());
        }
        assert_eq!(queue.dequeue(&mut out).unwrap(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn failed_enqueue_leaves_queue_intact() {
        let mut queue = TxQueue::with_capacity(32);
        queue.enqueue(&[7u8; 20]).unwrap();
        let used = queue.used();

        let err = queue.enqueue(&[9u8; 10]).unwrap_err();
        assert!(matches!(err, FrameError::QueueFull { needed: 12, free: 9 }));
        assert_eq!(queue.used(), used);
        assert_eq!(queue.len(), 1);

        let mut out = [0u8; 64];
        assert_eq!(queue.dequeue(&mut out).unwrap(), Some(20));
        assert_eq!(&out[..20], &[7u8; 20]);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let mut queue = TxQueue::with_capacity(16);
        queue.enqueue(&[1u8; 13]).unwrap();
        assert_eq!(queue.free_space(), 0);
    }

    #[test]
    fn oversized_record_is_consumed_with_error() {
        let mut queue = TxQueue::new();
        queue.enqueue(&[1u8; 40]).unwrap();
        queue.enqueue(&[2u8; 4]).unwrap();

        let mut small = [0u8; 16];
        assert!(matches!(
            queue.dequeue(&mut small),
            Err(FrameError::RecordTooLarge {
                size: 40,
                capacity: 16
            })
        ));
        assert_eq!(queue.dequeue(&mut small).unwrap(), Some(4));
        assert_eq!(&small[..4], &[2u8; 4]);
    }

    #[test]
    fn records_wrap_around_the_ring() {
        let mut queue = TxQueue::with_capacity(64);
        let mut out = [0u8; 64];
        for round in 0..20u8 {
            queue.enqueue(&[round; 25]).unwrap();
            queue.enqueue(&[round.wrapping_add(100); 7]).unwrap();
            assert_eq!(queue.dequeue(&mut out).unwrap(), Some(25));
            assert_eq!(&out[..25], &[round; 25]);
            assert_eq!(queue.dequeue(&mut out).unwrap(), Some(7));
            assert_eq!(out[0], round.wrapping_add(100));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn incomplete_record_is_rewound() {
        // Hand-craft a prefix that claims more bytes than are queued.
        let mut queue = TxQueue::with_capacity(64);
        queue.ring.push_slice(&[10, 0, 1, 2, 3]);
        let mut out = [0u8; 64];
        assert_eq!(queue.dequeue(&mut out).unwrap(), None);
        assert_eq!(queue.used(), 5);

        queue.ring.push_slice(&[4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(queue.dequeue(&mut out).unwrap(), Some(10));
        assert_eq!(&out[..10], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }
}
