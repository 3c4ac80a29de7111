use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::frame_checksum;
use crate::error::{FrameError, Result};

/// Frame start marker.
pub const HEAD: [u8; 2] = [0xAA, 0x55];

/// Frame end marker.
pub const TAIL: [u8; 2] = [0x55, 0xAA];

/// Bytes outside the length-covered region: head (2) + length (2) + tail (2).
pub const FRAME_OVERHEAD: usize = 6;

/// Length-covered bytes besides the payload: cmd (1) + seq (1) + crc (2).
const LENGTH_FIXED: usize = 4;

/// Smallest valid frame (empty payload).
pub const MIN_FRAME_SIZE: usize = FRAME_OVERHEAD + LENGTH_FIXED;

/// Largest frame accepted on the wire, markers included.
pub const MAX_FRAME_SIZE: usize = 8192;

/// Largest payload that fits in [`MAX_FRAME_SIZE`].
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - MIN_FRAME_SIZE;

/// Header fields of a parsed frame; the payload is copied to a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: u8,
    pub seq: u8,
    pub payload_len: usize,
}

/// An owned, decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command id, see [`crate::command`].
    pub command: u8,
    /// Correlation id echoed by responses.
    pub seq: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u8, seq: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (markers, length, checksum, payload).
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.command, self.seq, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Size of the encoded frame for a payload of `payload_len` bytes.
pub fn frame_size(payload_len: usize) -> usize {
    MIN_FRAME_SIZE + payload_len
}

fn length_field(payload_len: usize) -> Result<u16> {
    u16::try_from(LENGTH_FIXED + payload_len).map_err(|_| FrameError::PayloadTooLarge {
        size: payload_len,
        max: u16::MAX as usize - LENGTH_FIXED,
    })
}

/// Serialize a frame into `out`, returning the number of bytes written.
///
/// Wire format:
/// ```text
/// ┌──────────┬───────────┬─────┬─────┬───────────┬──────────┬──────────┐
/// │ Head     │ Length    │ Cmd │ Seq │ Payload   │ CRC16    │ Tail     │
/// │ AA 55    │ (2B LE)   │ 1B  │ 1B  │ N bytes   │ (2B LE)  │ 55 AA    │
/// └──────────┴───────────┴─────┴─────┴───────────┴──────────┴──────────┘
/// ```
/// `Length` counts cmd, seq, payload and CRC. The CRC covers cmd through the
/// end of the payload.
pub fn build_frame(command: u8, seq: u8, payload: &[u8], out: &mut [u8]) -> Result<usize> {
    let length = length_field(payload.len())?;
    let total = FRAME_OVERHEAD + length as usize;
    if total > out.len() {
        return Err(FrameError::BufferTooSmall {
            needed: total,
            capacity: out.len(),
        });
    }

    let body_end = 6 + payload.len();
    out[0..2].copy_from_slice(&HEAD);
    out[2..4].copy_from_slice(&length.to_le_bytes());
    out[4] = command;
    out[5] = seq;
    out[6..body_end].copy_from_slice(payload);
    let crc = frame_checksum(&out[4..body_end]);
    out[body_end..body_end + 2].copy_from_slice(&crc.to_le_bytes());
    out[body_end + 2..total].copy_from_slice(&TAIL);
    Ok(total)
}

/// Append an encoded frame to `dst`.
///
/// Frames larger than [`MAX_FRAME_SIZE`] are rejected, as the receiving side
/// would discard them.
pub fn encode_frame(command: u8, seq: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let length = length_field(payload.len())?;
    dst.reserve(frame_size(payload.len()));
    dst.put_slice(&HEAD);
    dst.put_u16_le(length);
    let body_start = dst.len();
    dst.put_u8(command);
    dst.put_u8(seq);
    dst.put_slice(payload);
    let crc = frame_checksum(&dst[body_start..]);
    dst.put_u16_le(crc);
    dst.put_slice(&TAIL);
    Ok(())
}

/// Validate one complete frame and copy its payload into `payload_out`.
///
/// `input` must hold exactly one frame. Checks run in order: minimum size,
/// head, tail, length field, checksum, payload capacity. The payload is only
/// copied once the checksum has been verified.
pub fn parse_frame(input: &[u8], payload_out: &mut [u8]) -> Result<FrameHeader> {
    let (header, payload) = validate(input)?;
    if payload.len() > payload_out.len() {
        return Err(FrameError::BufferTooSmall {
            needed: payload.len(),
            capacity: payload_out.len(),
        });
    }
    payload_out[..payload.len()].copy_from_slice(payload);
    Ok(header)
}

/// Decode one complete frame into an owned [`Frame`].
pub fn decode_frame(input: &[u8]) -> Result<Frame> {
    let (header, payload) = validate(input)?;
    Ok(Frame {
        command: header.command,
        seq: header.seq,
        payload: Bytes::copy_from_slice(payload),
    })
}

fn validate(input: &[u8]) -> Result<(FrameHeader, &[u8])> {
    if input.len() < MIN_FRAME_SIZE {
        return Err(FrameError::LengthMismatch);
    }
    if input[0..2] != HEAD {
        return Err(FrameError::HeaderMismatch);
    }
    if input[input.len() - 2..] != TAIL {
        return Err(FrameError::TailMismatch);
    }

    let length = u16::from_le_bytes([input[2], input[3]]) as usize;
    if FRAME_OVERHEAD + length != input.len() || length < LENGTH_FIXED {
        return Err(FrameError::LengthMismatch);
    }

    let body_end = input.len() - 4;
    let expected = u16::from_le_bytes([input[body_end], input[body_end + 1]]);
    let actual = frame_checksum(&input[4..body_end]);
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let payload = &input[6..body_end];
    Ok((
        FrameHeader {
            command: input[4],
            seq: input[5],
            payload_len: payload.len(),
        },
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::command;

    #[test]
    fn build_configure_stream_layout() {
        let payload = [0x02, 0x00, 0x10, 0x27, 0x00, 0x00, 0x01];
        let mut out = [0u8; 32];
        let n = build_frame(command::CONFIGURE_STREAM, 0x07, &payload, &mut out).unwrap();

        assert_eq!(n, 17);
        assert_eq!(&out[0..2], &HEAD);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 11);
        assert_eq!(out[4], 0x14);
        assert_eq!(out[5], 0x07);
        assert_eq!(&out[6..13], &payload);
        let crc = frame_checksum(&out[4..13]);
        assert_eq!(u16::from_le_bytes([out[13], out[14]]), crc);
        assert_eq!(&out[15..17], &TAIL);
    }

    #[test]
    fn empty_payload_is_minimum_frame() {
        let mut out = [0u8; MIN_FRAME_SIZE];
        assert_eq!(build_frame(command::PING, 1, &[], &mut out).unwrap(), 10);

        let mut payload = [0u8; 0];
        let header = parse_frame(&out, &mut payload).unwrap();
        assert_eq!(header.command, command::PING);
        assert_eq!(header.seq, 1);
        assert_eq!(header.payload_len, 0);
    }

    #[test]
    fn build_rejects_small_buffer() {
        let mut out = [0u8; 12];
        let err = build_frame(command::PONG, 0, &[0u8; 8], &mut out).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferTooSmall {
                needed: 18,
                capacity: 12
            }
        ));
    }

    #[test]
    fn build_rejects_unrepresentable_length() {
        let payload = vec![0u8; u16::MAX as usize];
        let mut out = vec![0u8; payload.len() + MIN_FRAME_SIZE];
        assert!(matches!(
            build_frame(command::DATA_PACKET, 0, &payload, &mut out),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn parse_checks_in_order() {
        let mut wire = [0u8; 12];
        build_frame(command::ACK, 3, &[1, 2], &mut wire).unwrap();
        let mut payload = [0u8; 8];

        assert!(matches!(
            parse_frame(&wire[..9], &mut payload),
            Err(FrameError::LengthMismatch)
        ));

        let mut bad = wire;
        bad[0] = 0xAB;
        bad[11] = 0x00;
        assert!(matches!(
            parse_frame(&bad, &mut payload),
            Err(FrameError::HeaderMismatch)
        ));

        let mut bad = wire;
        bad[11] = 0x00;
        bad[6] ^= 0xFF;
        assert!(matches!(
            parse_frame(&bad, &mut payload),
            Err(FrameError::TailMismatch)
        ));

        let mut bad = wire;
        bad[2] = 9;
        bad[6] ^= 0xFF;
        assert!(matches!(
            parse_frame(&bad, &mut payload),
            Err(FrameError::LengthMismatch)
        ));

        let mut bad = wire;
        bad[6] ^= 0xFF;
        assert!(matches!(
            parse_frame(&bad, &mut payload),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn parse_requires_exact_length() {
        let mut wire = BytesMut::new();
        encode_frame(command::PING, 0, &[], &mut wire).unwrap();
        wire.put_u8(0xFF);
        assert!(decode_frame(&wire).is_err());
    }

    #[test]
    fn parse_rejects_small_payload_buffer_after_crc() {
        let mut wire = [0u8; 14];
        build_frame(command::PONG, 9, &[1, 2, 3, 4], &mut wire).unwrap();

        let mut small = [0u8; 3];
        assert!(matches!(
            parse_frame(&wire, &mut small),
            Err(FrameError::BufferTooSmall {
                needed: 4,
                capacity: 3
            })
        ));
        assert_eq!(small, [0, 0, 0]);

        // Corruption wins over capacity.
        wire[7] ^= 0x01;
        assert!(matches!(
            parse_frame(&wire, &mut small),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn encode_matches_build() {
        let payload = b"daqsim";
        let mut fixed = [0u8; 64];
        let n = build_frame(command::LOG_MESSAGE, 200, payload, &mut fixed).unwrap();

        let frame = Frame::new(command::LOG_MESSAGE, 200, &payload[..]);
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded.as_ref(), &fixed[..n]);
        assert_eq!(frame.wire_size(), n);
    }

    #[test]
    fn encode_rejects_oversized_frame() {
        let mut dst = BytesMut::new();
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            encode_frame(command::DATA_PACKET, 0, &payload, &mut dst),
            Err(FrameError::PayloadTooLarge { .. })
        ));
        assert!(dst.is_empty());
    }

    proptest! {
        #[test]
        fn roundtrip(command in any::<u8>(), seq in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..600)) {
            let mut wire = vec![0u8; frame_size(payload.len())];
            let n = build_frame(command, seq, &payload, &mut wire).unwrap();
            prop_assert_eq!(n, payload.len() + 10);

            let mut out = vec![0u8; payload.len()];
            let header = parse_frame(&wire, &mut out).unwrap();
            prop_assert_eq!(header.command, command);
            prop_assert_eq!(header.seq, seq);
            prop_assert_eq!(header.payload_len, payload.len());
            prop_assert_eq!(out, payload);
        }

        #[test]
        fn single_bit_flip_is_rejected(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut wire = vec![0u8; frame_size(payload.len())];
            build_frame(command::DATA_PACKET, 5, &payload, &mut wire).unwrap();
            let idx = position.index(wire.len());
            wire[idx] ^= 1 << bit;
            prop_assert!(decode_frame(&wire).is_err());
        }
    }
}
