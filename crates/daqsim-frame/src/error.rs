/// Coarse error taxonomy shared by codec and queue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Structurally malformed input (markers, length field).
    Format,
    /// Checksum mismatch.
    Integrity,
    /// A buffer or queue could not hold the data.
    Capacity,
}

/// Errors that can occur during frame encoding/decoding and buffering.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with `AA 55`.
    #[error("invalid frame head (expected 0xAA 0x55)")]
    HeaderMismatch,

    /// The frame does not end with `55 AA`.
    #[error("invalid frame tail (expected 0x55 0xAA)")]
    TailMismatch,

    /// The length field disagrees with the bytes present.
    #[error("frame length mismatch")]
    LengthMismatch,

    #[error("frame checksum mismatch (expected {expected:#06x}, got {actual:#06x})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("buffer too small ({needed} bytes needed, capacity {capacity})")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Not enough free space in the TX queue; nothing was written.
    #[error("tx queue full ({needed} bytes needed, {free} free)")]
    QueueFull { needed: usize, free: usize },

    /// A queued record is larger than the caller's output buffer. The record
    /// has been consumed.
    #[error("queued record too large ({size} bytes, capacity {capacity})")]
    RecordTooLarge { size: usize, capacity: usize },
}

impl FrameError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::HeaderMismatch | Self::TailMismatch | Self::LengthMismatch => ErrorClass::Format,
            Self::ChecksumMismatch { .. } => ErrorClass::Integrity,
            Self::BufferTooSmall { .. }
            | Self::PayloadTooLarge { .. }
            | Self::QueueFull { .. }
            | Self::RecordTooLarge { .. } => ErrorClass::Capacity,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
