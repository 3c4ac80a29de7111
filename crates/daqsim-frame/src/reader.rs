use tracing::{debug, trace};

use crate::codec::{FRAME_OVERHEAD, HEAD, MAX_FRAME_SIZE};
use crate::ring::RingBuffer;

/// Default RX ring size in bytes.
pub const DEFAULT_RX_CAPACITY: usize = 65535;

/// Bytes that must be buffered before a scan is attempted.
pub const MIN_SCAN_LEN: usize = 8;

/// Receive-side byte ring with a resynchronizing frame extractor.
///
/// Bytes arrive in arbitrary chunks through [`feed`](Self::feed); complete
/// candidate frames (head marker plus a plausible length) are cut out by
/// [`extract_frame`](Self::extract_frame). Extraction only frames bytes;
/// integrity is checked by [`crate::parse_frame`].
#[derive(Debug)]
pub struct RxBuffer {
    ring: RingBuffer,
    max_frame_size: usize,
    dropped: u64,
}

impl RxBuffer {
    /// Create a buffer with the default size and frame limit.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RX_CAPACITY, MAX_FRAME_SIZE)
    }

    /// Create a buffer with an explicit ring size and largest accepted frame.
    pub fn with_capacity(capacity: usize, max_frame_size: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            max_frame_size,
            dropped: 0,
        }
    }

    /// Append received bytes.
    ///
    /// Copies as many bytes as fit and silently drops the rest. Returns the
    /// number accepted so the caller can detect loss.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        let accepted = self.ring.push_slice(data);
        if accepted < data.len() {
            self.dropped += (data.len() - accepted) as u64;
        }
        accepted
    }

    /// Try to cut one frame out of the buffer into `scratch`.
    ///
    /// Returns the frame size on success. Returns `None` when fewer than
    /// [`MIN_SCAN_LEN`] bytes are buffered, when no head marker is found, or
    /// when the next candidate frame is still incomplete. Candidates whose
    /// length field exceeds the frame limit (or `scratch`) are treated as
    /// noise and the scan moves on by one byte.
    ///
    /// Bytes skipped by the scan are discarded even when no frame results;
    /// an incomplete candidate is kept from its head marker onwards.
    pub fn extract_frame(&mut self, scratch: &mut [u8]) -> Option<usize> {
        let available = self.ring.available();
        if available < MIN_SCAN_LEN {
            return None;
        }

        let limit = self.max_frame_size.min(scratch.len());
        let mut pos = 0usize;

        while pos + 1 < available {
            if self.ring.peek_at(pos) != HEAD[0] || self.ring.peek_at(pos + 1) != HEAD[1] {
                pos += 1;
                continue;
            }
            if pos + 4 > available {
                // Candidate head without its length field yet.
                break;
            }

            let length = u16::from_le_bytes([self.ring.peek_at(pos + 2), self.ring.peek_at(pos + 3)]);
            let frame_size = FRAME_OVERHEAD + length as usize;
            if frame_size > limit {
                trace!(frame_size, limit, "oversized candidate, skipping");
                pos += 1;
                continue;
            }
            if pos + frame_size > available {
                break;
            }

            self.ring.copy_out(pos, &mut scratch[..frame_size]);
            self.ring.advance(pos + frame_size);
            if pos > 0 {
                debug!(skipped = pos, "resynchronized on frame head");
            }
            return Some(frame_size);
        }

        if pos > 0 {
            debug!(discarded = pos, "discarded bytes without frame head");
            self.ring.advance(pos);
        }
        None
    }

    /// Extract frames until none remain, passing each to `handler` in order.
    /// Returns the number of frames delivered.
    pub fn drain_frames<F>(&mut self, scratch: &mut [u8], mut handler: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut count = 0usize;
        while let Some(n) = self.extract_frame(scratch) {
            handler(&scratch[..n]);
            count += 1;
        }
        count
    }

    /// Buffered bytes not yet extracted.
    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total bytes refused by [`feed`](Self::feed) since creation or reset.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.ring.reset();
        self.dropped = 0;
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{build_frame, decode_frame, frame_size, MIN_FRAME_SIZE};
    use crate::command;

    fn frame(command: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; frame_size(payload.len())];
        build_frame(command, seq, payload, &mut out).unwrap();
        out
    }

    #[test]
    fn extracts_single_frame() {
        let wire = frame(command::PING, 1, &[]);
        let mut rx = RxBuffer::new();
        assert_eq!(rx.feed(&wire), wire.len());

        let mut scratch = [0u8; MAX_FRAME_SIZE];
        assert_eq!(rx.extract_frame(&mut scratch), Some(MIN_FRAME_SIZE));
        assert_eq!(&scratch[..MIN_FRAME_SIZE], wire.as_slice());
        assert!(rx.is_empty());
    }

    #[test]
    fn resyncs_past_leading_noise() {
        let wire = frame(command::GET_STATUS, 4, &[]);
        let mut stream = vec![0xFF, 0xFF];
        stream.extend_from_slice(&wire);
        stream.push(0xFF);

        let mut rx = RxBuffer::new();
        rx.feed(&stream);

        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let n = rx.extract_frame(&mut scratch).unwrap();
        let decoded = decode_frame(&scratch[..n]).unwrap();
        assert_eq!(decoded.command, command::GET_STATUS);
        assert_eq!(decoded.seq, 4);

        assert_eq!(rx.extract_frame(&mut scratch), None);
        assert_eq!(rx.available(), 1);
    }

    #[test]
    fn stray_header_before_frame_is_skipped() {
        // The stray AA 55 reads its length from the real frame's head bytes.
        let wire = frame(command::PING, 7, &[]);
        let mut stream = vec![0xFF, 0xFF, 0xAA, 0x55];
        stream.extend_from_slice(&wire);
        stream.push(0xFF);

        let mut rx = RxBuffer::new();
        assert_eq!(rx.feed(&stream), stream.len());

        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let mut frames = Vec::new();
        let count = rx.drain_frames(&mut scratch, |f| frames.push(f.to_vec()));
        assert_eq!(count, 1);
        assert_eq!(frames, vec![wire]);
    }

    #[test]
    fn waits_for_partial_frame() {
        let wire = frame(command::CONFIGURE_STREAM, 2, &[1, 0, 0x10, 0x27, 0, 0, 1]);
        let mut rx = RxBuffer::new();
        let mut scratch = [0u8; MAX_FRAME_SIZE];

        rx.feed(&wire[..9]);
        assert_eq!(rx.extract_frame(&mut scratch), None);
        assert_eq!(rx.available(), 9);

        rx.feed(&wire[9..]);
        assert_eq!(rx.extract_frame(&mut scratch), Some(wire.len()));
    }

    #[test]
    fn byte_by_byte_delivery() {
        let wire = frame(command::PING, 77, &[]);
        let mut rx = RxBuffer::new();
        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let mut found = None;
        for byte in &wire {
            rx.feed(std::slice::from_ref(byte));
            if let Some(n) = rx.extract_frame(&mut scratch) {
                found = Some(n);
            }
        }
        assert_eq!(found, Some(wire.len()));
    }

    #[test]
    fn oversized_length_skips_one_byte() {
        // Head with an absurd length, followed by a real frame.
        let mut stream = vec![0xAA, 0x55, 0xFF, 0x7F];
        let wire = frame(command::PING, 3, &[]);
        stream.extend_from_slice(&wire);

        let mut rx = RxBuffer::new();
        rx.feed(&stream);
        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let n = rx.extract_frame(&mut scratch).unwrap();
        assert_eq!(&scratch[..n], wire.as_slice());
    }

    #[test]
    fn noise_never_stalls_the_buffer() {
        let mut rx = RxBuffer::with_capacity(64, MAX_FRAME_SIZE);
        let mut scratch = [0u8; MAX_FRAME_SIZE];

        for _ in 0..10 {
            rx.feed(&[0x13; 40]);
            assert_eq!(rx.extract_frame(&mut scratch), None);
        }
        // At most one trailing byte is retained as a possible head start.
        assert!(rx.available() <= 1);

        let wire = frame(command::PING, 9, &[]);
        assert_eq!(rx.feed(&wire), wire.len());
        assert_eq!(rx.extract_frame(&mut scratch), Some(wire.len()));
    }

    #[test]
    fn feed_truncates_when_full() {
        let mut rx = RxBuffer::with_capacity(16, MAX_FRAME_SIZE);
        assert_eq!(rx.feed(&[0u8; 20]), 15);
        assert_eq!(rx.dropped_bytes(), 5);
        assert_eq!(rx.free_space(), 0);
        rx.reset();
        assert!(rx.is_empty());
        assert_eq!(rx.dropped_bytes(), 0);
    }

    #[test]
    fn drain_delivers_in_order() {
        let mut stream = Vec::new();
        for seq in 0..5u8 {
            stream.extend_from_slice(&frame(command::PING, seq, &[seq; 3]));
            stream.push(0x00);
        }
        let mut rx = RxBuffer::new();
        rx.feed(&stream);

        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let mut seqs = Vec::new();
        let count = rx.drain_frames(&mut scratch, |bytes| {
            seqs.push(decode_frame(bytes).unwrap().seq);
        });
        assert_eq!(count, 5);
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn corrupted_frame_is_still_framed() {
        let mut wire = frame(command::PING, 1, &[5, 6]);
        wire[6] ^= 0x01;
        let mut rx = RxBuffer::new();
        rx.feed(&wire);
        let mut scratch = [0u8; MAX_FRAME_SIZE];
        let n = rx.extract_frame(&mut scratch).unwrap();
        assert!(decode_frame(&scratch[..n]).is_err());
        assert!(rx.is_empty());
    }
}
