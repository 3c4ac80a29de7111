//! Checksummed binary framing for the daqsim device protocol.
//!
//! Every message on the wire is framed with:
//! - a 2-byte head marker `AA 55`
//! - a 2-byte little-endian length covering command, seq, payload and checksum
//! - a command id and a sequence byte
//! - a CRC16/MODBUS checksum and a 2-byte tail marker `55 AA`
//!
//! [`RxBuffer`] turns an arbitrarily chunked byte stream back into frames and
//! resynchronizes after noise; [`TxQueue`] buffers outgoing frames as whole
//! records.

pub mod codec;
pub mod command;
pub mod crc;
pub mod error;
pub mod reader;
pub mod ring;
pub mod writer;

pub use codec::{
    build_frame, decode_frame, encode_frame, frame_size, parse_frame, Frame, FrameHeader,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE,
};
pub use command::command_name;
pub use crc::{crc16, frame_checksum, CRC_INIT};
pub use error::{ErrorClass, FrameError, Result};
pub use reader::{RxBuffer, DEFAULT_RX_CAPACITY, MIN_SCAN_LEN};
pub use ring::RingBuffer;
pub use writer::{TxQueue, DEFAULT_TX_CAPACITY};
